//! Per-connection admission control.
//!
//! Every connection starts `Unauthenticated`. The first request carrying a
//! username and a token that verifies locally triggers exactly one
//! admission decision:
//!
//! ```text
//! Unauthenticated ──(token ok)──→ PendingAdmission ──(quota ok)──→ Admitted ──→ Closed
//!        ↑   │                           │
//!        └───┘ (no/bad token:            └──(identity unreachable,
//!               "Please authenticate first")  rejected, or at capacity)──→ Rejected
//! ```
//!
//! `Rejected` is terminal: the handler sends the reason and closes the
//! socket. Requests on an `Admitted` connection are never re-checked
//! against the quota.
//!
//! The quota is tier-derived: the Identity Service reports the caller's
//! `connection_limit` and the controller compares it against one global
//! live-connection counter. Check and increment happen under a single
//! lock acquisition, so two racing connections can never both take the
//! last slot.

use std::sync::Arc;
use std::time::Instant;

use keystone_protocol::{AccountInfo, QuotaError, ServiceError, TokenAuthority};
use keystone_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::{IdentityDirectory, SessionRegistry};

// ---------------------------------------------------------------------------
// ConnectionSession
// ---------------------------------------------------------------------------

/// Where a connection is in the admission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    PendingAdmission,
    Admitted,
    Rejected,
    Closed,
}

/// What the server knows about one live connection. Never persisted.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub conn_id: ConnectionId,
    pub connected_at: Instant,
    pub state: ConnectionState,
    /// Set once admitted.
    pub username: Option<String>,
    pub token: Option<String>,
    /// Account snapshot taken at admission.
    pub account: Option<AccountInfo>,
}

impl ConnectionSession {
    pub fn new(conn_id: ConnectionId) -> Self {
        Self {
            conn_id,
            connected_at: Instant::now(),
            state: ConnectionState::Unauthenticated,
            username: None,
            token: None,
            account: None,
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.state == ConnectionState::Admitted
    }

    /// `true` if the admitted account is an admin.
    pub fn is_admin(&self) -> bool {
        self.account.as_ref().is_some_and(|a| a.is_admin)
    }
}

// ---------------------------------------------------------------------------
// ConnectionCounter
// ---------------------------------------------------------------------------

/// The live count of admitted connections across all users.
#[derive(Debug, Default)]
pub struct ConnectionCounter {
    current: u32,
}

impl ConnectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a slot if fewer than `limit` are in use, or unconditionally
    /// when `bypass` is set. Returns the new count.
    ///
    /// # Errors
    /// [`QuotaError::CapacityExceeded`] when the limit is reached.
    pub fn try_acquire(&mut self, limit: u32, bypass: bool) -> Result<u32, QuotaError> {
        if !bypass && self.current >= limit {
            return Err(QuotaError::CapacityExceeded {
                current: self.current,
                limit,
            });
        }
        self.current += 1;
        Ok(self.current)
    }

    /// Frees one slot. Never goes below zero.
    pub fn release(&mut self) -> u32 {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    pub fn current(&self) -> u32 {
        self.current
    }
}

// ---------------------------------------------------------------------------
// AdmissionController
// ---------------------------------------------------------------------------

/// Gatekeeper for new connections.
pub struct AdmissionController<D> {
    directory: Arc<D>,
    tokens: TokenAuthority,
    registry: Arc<Mutex<SessionRegistry>>,
    counter: Mutex<ConnectionCounter>,
    admin_bypass: bool,
}

impl<D: IdentityDirectory> AdmissionController<D> {
    /// `admin_bypass` lets admin accounts connect even at capacity.
    pub fn new(
        directory: Arc<D>,
        tokens: TokenAuthority,
        registry: Arc<Mutex<SessionRegistry>>,
        admin_bypass: bool,
    ) -> Self {
        Self {
            directory,
            tokens,
            registry,
            counter: Mutex::new(ConnectionCounter::new()),
            admin_bypass,
        }
    }

    /// Runs the admission decision for `session`.
    ///
    /// # Errors
    /// - [`ServiceError::Unauthenticated`]: missing or invalid token; the
    ///   session stays `Unauthenticated` and may try again
    /// - anything else: the session is now `Rejected`
    pub async fn admit(
        &self,
        session: &mut ConnectionSession,
        username: &str,
        token: &str,
    ) -> Result<AccountInfo, ServiceError> {
        if session.state != ConnectionState::Unauthenticated {
            return Err(ServiceError::Unauthenticated);
        }
        if username.is_empty() || !self.tokens.verify(token, username) {
            return Err(ServiceError::Unauthenticated);
        }
        session.state = ConnectionState::PendingAdmission;

        let info = match self.directory.account_info(username, token).await {
            Ok(info) => info,
            Err(e) => {
                session.state = ConnectionState::Rejected;
                tracing::info!(conn_id = %session.conn_id, %username, error = %e, "connection rejected: no account info");
                return Err(e.into());
            }
        };

        let bypass = self.admin_bypass && info.is_admin;
        let acquired = self
            .counter
            .lock()
            .await
            .try_acquire(info.connection_limit, bypass);
        let current = match acquired {
            Ok(current) => current,
            Err(e) => {
                session.state = ConnectionState::Rejected;
                tracing::info!(conn_id = %session.conn_id, %username, limit = info.connection_limit, "connection rejected: at capacity");
                return Err(e.into());
            }
        };

        self.registry.lock().await.mark_online(username);

        session.state = ConnectionState::Admitted;
        session.username = Some(username.to_string());
        session.token = Some(token.to_string());
        session.account = Some(info.clone());
        tracing::info!(
            conn_id = %session.conn_id,
            %username,
            tier = %info.tier,
            connections = current,
            limit = info.connection_limit,
            "connection admitted"
        );
        Ok(info)
    }

    /// Releases an admitted session's slot, then clears its presence.
    /// Safe to call for sessions that were never admitted.
    pub async fn close(&self, session: &mut ConnectionSession) {
        if session.is_admitted() {
            let remaining = self.counter.lock().await.release();
            if let Some(username) = &session.username {
                self.registry.lock().await.mark_offline(username);
            }
            tracing::info!(conn_id = %session.conn_id, connections = remaining, "admitted connection closed");
        }
        session.state = ConnectionState::Closed;
    }

    /// Number of currently admitted connections.
    pub async fn connection_count(&self) -> u32 {
        self.counter.lock().await.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_rejects_at_limit() {
        let mut counter = ConnectionCounter::new();
        assert_eq!(counter.try_acquire(2, false), Ok(1));
        assert_eq!(counter.try_acquire(2, false), Ok(2));
        assert_eq!(
            counter.try_acquire(2, false),
            Err(QuotaError::CapacityExceeded { current: 2, limit: 2 })
        );
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_try_acquire_bypass_ignores_limit() {
        let mut counter = ConnectionCounter::new();
        counter.try_acquire(1, false).unwrap();
        assert_eq!(counter.try_acquire(1, true), Ok(2));
    }

    #[test]
    fn test_release_never_underflows() {
        let mut counter = ConnectionCounter::new();
        assert_eq!(counter.release(), 0);
        counter.try_acquire(5, false).unwrap();
        assert_eq!(counter.release(), 0);
    }

    #[test]
    fn test_new_session_is_unauthenticated() {
        let session = ConnectionSession::new(ConnectionId::new(1));
        assert_eq!(session.state, ConnectionState::Unauthenticated);
        assert!(!session.is_admitted());
        assert!(!session.is_admin());
    }
}
