//! Identity Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use keystone_protocol::{TierTable, TokenConfig};
use keystone_transport::WireFormat;

use crate::EnergyCost;

/// Credentials of the admin account seeded at startup.
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "Admin123!".to_string(),
        }
    }
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Everything the Identity Service needs to start.
///
/// Start from `IdentityConfig::default()` and override what you need:
///
/// ```rust
/// use keystone_identity::IdentityConfig;
///
/// let config = IdentityConfig::default()
///     .bind("127.0.0.1:0")
///     .data_file(None)
///     .hash_cost(4);
/// assert_eq!(config.bind_addr, "127.0.0.1:0");
/// ```
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub bind_addr: String,
    /// Where accounts are persisted. `None` keeps everything in memory.
    pub data_file: Option<PathBuf>,
    pub wire: WireFormat,
    pub connection_limits: TierTable,
    pub energy_cost: EnergyCost,
    pub admin: AdminSeed,
    pub tokens: TokenConfig,
    /// bcrypt work factor.
    pub hash_cost: u32,
    /// How long shutdown waits for open connections before aborting them.
    pub drain_timeout: Duration,
    /// Drop a connection after this long without a request.
    pub idle_timeout: Option<Duration>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            data_file: Some(PathBuf::from("users.json")),
            wire: WireFormat::default(),
            connection_limits: TierTable::connection_limits_default(),
            energy_cost: EnergyCost::default(),
            admin: AdminSeed::default(),
            tokens: TokenConfig::default(),
            hash_cost: bcrypt::DEFAULT_COST,
            drain_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }
}

impl IdentityConfig {
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
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

    pub fn connection_limits(mut self, table: TierTable) -> Self {
        self.connection_limits = table;
        self
    }

    pub fn energy_cost(mut self, cost: EnergyCost) -> Self {
        self.energy_cost = cost;
        self
    }

    pub fn admin(mut self, seed: AdminSeed) -> Self {
        self.admin = seed;
        self
    }

    pub fn tokens(mut self, tokens: TokenConfig) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
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
