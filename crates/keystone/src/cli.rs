//! Command-line arguments for the two service binaries.
//!
//! Every flag has an environment fallback so the services can be
//! configured the same way under a process supervisor. The token flags
//! must agree between the two processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser};
use keystone_identity::{AdminSeed, EnergyCost, IdentityConfig};
use keystone_protocol::{TokenConfig, TokenScheme};
use keystone_session::SessionConfig;
use keystone_transport::WireFormat;

/// Token and framing settings shared by both services.
#[derive(Debug, Clone, Args)]
pub struct SharedArgs {
    /// Secret used to sign and verify tokens
    #[arg(long, env = "KEYSTONE_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Token format: signed or legacy
    #[arg(long, env = "KEYSTONE_TOKEN_SCHEME", default_value = "signed")]
    pub token_scheme: TokenScheme,

    /// Lifetime of a signed token, in seconds
    #[arg(long, env = "KEYSTONE_TOKEN_TTL_SECS", default_value_t = 24 * 60 * 60)]
    pub token_ttl_secs: u64,

    /// Framing: length-prefixed or legacy
    #[arg(long, env = "KEYSTONE_WIRE", default_value = "length-prefixed")]
    pub wire: WireFormat,

    /// Seconds to wait for open connections at shutdown
    #[arg(long, env = "KEYSTONE_DRAIN_TIMEOUT_SECS", default_value_t = 5)]
    pub drain_timeout_secs: u64,

    /// Drop connections idle for this many seconds
    #[arg(long, env = "KEYSTONE_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Keep state in memory only; nothing is loaded or saved
    #[arg(long)]
    pub in_memory: bool,
}

impl SharedArgs {
    pub fn tokens(&self) -> TokenConfig {
        let tokens = TokenConfig::default()
            .with_scheme(self.token_scheme)
            .with_ttl_secs(self.token_ttl_secs);
        match &self.token_secret {
            Some(secret) => tokens.with_secret(secret.as_str()),
            None => tokens,
        }
    }

    fn data_file(&self, path: &Path) -> Option<PathBuf> {
        (!self.in_memory).then(|| path.to_path_buf())
    }

    fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// Identity Service: accounts, credentials, and energy.
#[derive(Debug, Parser)]
#[command(name = "identity-server", version, about)]
pub struct IdentityArgs {
    /// Address to listen on
    #[arg(long, env = "KEYSTONE_IDENTITY_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Account record file
    #[arg(long, env = "KEYSTONE_USERS_FILE", default_value = "users.json")]
    pub data_file: PathBuf,

    /// bcrypt work factor
    #[arg(long, env = "KEYSTONE_HASH_COST", default_value_t = 12)]
    pub hash_cost: u32,

    /// Smallest energy debit per costed action (values below 1 count as 1)
    #[arg(long, default_value_t = 1)]
    pub energy_min: u32,

    /// Largest energy debit per costed action
    #[arg(long, default_value_t = 2)]
    pub energy_max: u32,

    /// Username of the admin account seeded at startup
    #[arg(long, env = "KEYSTONE_ADMIN_USERNAME", default_value = "admin")]
    pub admin_username: String,

    /// Password of the seeded admin account
    #[arg(
        long,
        env = "KEYSTONE_ADMIN_PASSWORD",
        default_value = "Admin123!",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub admin_password: String,

    #[command(flatten)]
    pub shared: SharedArgs,
}

impl IdentityArgs {
    pub fn into_config(self) -> IdentityConfig {
        IdentityConfig::default()
            .bind(&self.bind)
            .data_file(self.shared.data_file(&self.data_file))
            .wire(self.shared.wire)
            .hash_cost(self.hash_cost)
            .energy_cost(EnergyCost::new(self.energy_min, self.energy_max))
            .admin(AdminSeed {
                username: self.admin_username,
                password: self.admin_password,
            })
            .tokens(self.shared.tokens())
            .drain_timeout(self.shared.drain_timeout())
            .idle_timeout(self.shared.idle_timeout())
    }
}

/// Session Service: admission, presence, and inventories.
#[derive(Debug, Parser)]
#[command(name = "session-server", version, about)]
pub struct SessionArgs {
    /// Address to listen on
    #[arg(long, env = "KEYSTONE_SESSION_BIND", default_value = "0.0.0.0:8081")]
    pub bind: String,

    /// Address of the Identity Service
    #[arg(long, env = "KEYSTONE_IDENTITY_ADDR", default_value = "127.0.0.1:8080")]
    pub identity_addr: String,

    /// Player record file
    #[arg(long, env = "KEYSTONE_GAME_DATA_FILE", default_value = "game_data.json")]
    pub data_file: PathBuf,

    /// Let admin accounts connect even when the server is at capacity
    #[arg(long, env = "KEYSTONE_ADMIN_BYPASS_CAPACITY")]
    pub admin_bypass_capacity: bool,

    /// Username of the admin player seeded at startup
    #[arg(long, env = "KEYSTONE_ADMIN_USERNAME", default_value = "admin")]
    pub admin_username: String,

    #[command(flatten)]
    pub shared: SharedArgs,
}

impl SessionArgs {
    pub fn into_config(self) -> SessionConfig {
        SessionConfig::default()
            .bind(&self.bind)
            .identity_addr(&self.identity_addr)
            .data_file(self.shared.data_file(&self.data_file))
            .wire(self.shared.wire)
            .admin_bypass_capacity(self.admin_bypass_capacity)
            .admin_username(&self.admin_username)
            .tokens(self.shared.tokens())
            .drain_timeout(self.shared.drain_timeout())
            .idle_timeout(self.shared.idle_timeout())
    }
}
