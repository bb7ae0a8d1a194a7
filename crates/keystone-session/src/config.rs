//! Session Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use keystone_protocol::{TierTable, TokenConfig};
use keystone_transport::WireFormat;

/// Everything the Session Service needs to start.
///
/// ```rust
/// use keystone_session::SessionConfig;
///
/// let config = SessionConfig::default()
///     .bind("127.0.0.1:0")
///     .identity_addr("127.0.0.1:9000")
///     .admin_bypass_capacity(true);
/// assert_eq!(config.identity_addr, "127.0.0.1:9000");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub bind_addr: String,
    /// Where the Identity Service listens.
    pub identity_addr: String,
    /// Where players are persisted. `None` keeps everything in memory.
    pub data_file: Option<PathBuf>,
    /// Framing for both the client listener and the identity link.
    pub wire: WireFormat,
    pub inventory_capacity: TierTable,
    /// Let admin accounts connect even when the server is at capacity.
    pub admin_bypass_capacity: bool,
    /// The player seeded as admin at startup.
    pub admin_username: String,
    /// Must match the Identity Service's token settings.
    pub tokens: TokenConfig,
    pub drain_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            identity_addr: "127.0.0.1:8080".to_string(),
            data_file: Some(PathBuf::from("game_data.json")),
            wire: WireFormat::default(),
            inventory_capacity: TierTable::inventory_capacity_default(),
            admin_bypass_capacity: false,
            admin_username: "admin".to_string(),
            tokens: TokenConfig::default(),
            drain_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }
}

impl SessionConfig {
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn identity_addr(mut self, addr: &str) -> Self {
        self.identity_addr = addr.to_string();
        self
    }

    pub fn data_file(mut self, path: Option<PathBuf>) -> Self {
        self.data_file = path;
        self
    }

    pub fn wire(mut self, wire: WireFormat) -> Self {
        self.wire = wire;
        self
    }

    pub fn inventory_capacity(mut self, table: TierTable) -> Self {
        self.inventory_capacity = table;
        self
    }

    pub fn admin_bypass_capacity(mut self, bypass: bool) -> Self {
        self.admin_bypass_capacity = bypass;
        self
    }

    pub fn admin_username(mut self, username: &str) -> Self {
        self.admin_username = username.to_string();
        self
    }

    pub fn tokens(mut self, tokens: TokenConfig) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
