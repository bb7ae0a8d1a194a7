//! The Identity Service.
//!
//! Owns every account: credentials, tier, energy budget, and the admin
//! flag. Other services learn about an account only by asking this one.
//!
//! ```text
//! TcpTransport → handler (decode Request) → IdentityService::dispatch
//!                                              └─ Mutex<AccountStore>
//! ```
//!
//! - [`AccountStore`]: the accounts themselves and every operation on
//!   them. Plain `&mut self` methods; the service wraps it in one async
//!   mutex so all mutations are mutually exclusive.
//! - [`EnergyCost`]: the per-action energy debit range.
//! - [`PasswordPolicy`] / [`CredentialHasher`]: what a password must look
//!   like and how it is stored.
//! - [`IdentityServer`]: accept loop, graceful drain, persistence.

mod account;
mod config;
mod energy;
mod error;
mod handler;
mod password;
mod server;
mod service;

pub use account::{Account, AccountStore};
pub use config::{AdminSeed, IdentityConfig};
pub use energy::{EnergyCost, MAX_ENERGY};
pub use error::IdentityServerError;
pub use password::{BcryptHasher, CredentialHasher, HashError, PasswordPolicy};
pub use server::{IdentityServer, IdentityServerBuilder};
pub use service::IdentityService;
