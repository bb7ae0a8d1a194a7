//! The Session Service.
//!
//! Owns live connections and per-player state. It never stores
//! credentials: every identity question goes to the Identity Service
//! through an [`IdentityDirectory`].
//!
//! ```text
//! TcpTransport → handler ─┬─ AdmissionController ── IdentityDirectory (RPC)
//!                         │        ├─ ConnectionCounter
//!                         │        └─ SessionRegistry (presence)
//!                         └─ SessionService::dispatch ── Roster (players, pending rewards)
//! ```
//!
//! Lock discipline: the roster, the registry, the connection counter, and
//! the RPC channel each sit behind their own `tokio::sync::Mutex`. No code
//! path holds two of them at once, and nothing holds a lock while waiting
//! on the Identity Service.

mod admission;
mod catalog;
mod config;
mod directory;
mod error;
mod handler;
mod inventory;
mod player;
mod registry;
mod roster;
mod rpc;
mod server;
mod service;

pub use admission::{
    AdmissionController, ConnectionCounter, ConnectionSession, ConnectionState,
};
pub use catalog::{Catalog, ItemDefinition, ItemInstance, Money};
pub use config::SessionConfig;
pub use directory::{DirectoryError, IdentityDirectory};
pub use error::SessionServerError;
pub use inventory::Inventory;
pub use player::PlayerState;
pub use registry::SessionRegistry;
pub use roster::{AdventureOutcome, Roster, SpaceReport};
pub use rpc::IdentityRpcClient;
pub use server::{SessionServer, SessionServerBuilder, SessionStats};
pub use service::SessionService;
