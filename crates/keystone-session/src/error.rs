//! Error types for the Session Service process.

use keystone_protocol::{PersistenceError, ProtocolError};
use keystone_transport::TransportError;

/// Errors that stop the Session Service from starting or shutting down
/// cleanly. Per-request failures become failure responses instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
