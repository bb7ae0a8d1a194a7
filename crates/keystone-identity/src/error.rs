//! Error types for the Identity Service process.

use keystone_protocol::{PersistenceError, ProtocolError};
use keystone_transport::TransportError;

use crate::HashError;

/// Errors that stop the Identity Service from starting or shutting down
/// cleanly. Per-request failures never surface here; they become failure
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum IdentityServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("could not seed admin account: {0}")]
    AdminSeed(#[from] HashError),
}
