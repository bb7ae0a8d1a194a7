//! Unified error type for Keystone.

use keystone_identity::IdentityServerError;
use keystone_protocol::{PersistenceError, ProtocolError};
use keystone_session::SessionServerError;
use keystone_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically in the binaries.
#[derive(Debug, thiserror::Error)]
pub enum KeystoneError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Loading or saving a record file failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The Identity Service failed to start or stop.
    #[error(transparent)]
    Identity(#[from] IdentityServerError),

    /// The Session Service failed to start or stop.
    #[error(transparent)]
    Session(#[from] SessionServerError),

    /// Logging could not be initialised.
    #[error("failed to initialise tracing: {0}")]
    Telemetry(String),
}
