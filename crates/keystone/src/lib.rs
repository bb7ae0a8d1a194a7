//! # Keystone
//!
//! Two cooperating services for a tiered, quota-limited game backend:
//!
//! - the **Identity Service** ([`identity`]) owns accounts, credentials,
//!   tiers, and the energy budget;
//! - the **Session Service** ([`session`]) owns live connections and
//!   player inventories, and asks the Identity Service everything it
//!   needs to know about an account.
//!
//! ```text
//!  client ──TCP──→ Session Service ──TCP (one shared link)──→ Identity Service
//!                   ├─ admission (tier → connection limit)      ├─ AccountStore
//!                   ├─ presence                                 └─ energy ledger
//!                   └─ roster (tier → inventory capacity)
//! ```
//!
//! This crate ties the layers together: one error type, logging setup,
//! and the `identity-server` / `session-server` binaries.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystone::prelude::*;
//!
//! # async fn run() -> Result<(), KeystoneError> {
//! keystone::telemetry::init_tracing()?;
//! let server = IdentityServer::builder()
//!     .config(IdentityConfig::default().bind("127.0.0.1:8080"))
//!     .build()
//!     .await?;
//! server.run_until(keystone::telemetry::shutdown_signal()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod error;
pub mod telemetry;

pub use error::KeystoneError;

pub use keystone_identity as identity;
pub use keystone_protocol as protocol;
pub use keystone_session as session;
pub use keystone_transport as transport;

/// The types most programs need.
pub mod prelude {
    pub use crate::KeystoneError;
    pub use keystone_identity::{IdentityConfig, IdentityServer};
    pub use keystone_protocol::{
        Request, Response, ServiceError, Tier, TierTable, TokenConfig,
        TokenScheme,
    };
    pub use keystone_session::{SessionConfig, SessionServer};
    pub use keystone_transport::WireFormat;
}
