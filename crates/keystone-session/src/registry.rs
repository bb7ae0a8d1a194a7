//! Presence: which usernames are currently online.
//!
//! Tracked separately from the connection counter. On close the counter is
//! decremented first and presence cleared second, so a presence query can
//! briefly show a user whose slot is already free, never the reverse.

use std::collections::BTreeSet;

/// The set of online usernames. All operations are idempotent.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    online: BTreeSet<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the user was not already online.
    pub fn mark_online(&mut self, username: &str) -> bool {
        self.online.insert(username.to_string())
    }

    /// Returns `true` if the user was online.
    pub fn mark_offline(&mut self, username: &str) -> bool {
        self.online.remove(username)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.online.contains(username)
    }

    /// Online usernames in sorted order.
    pub fn list_online(&self) -> Vec<String> {
        self.online.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
