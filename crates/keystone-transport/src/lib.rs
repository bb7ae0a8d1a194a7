//! Transport layer for Keystone services.
//!
//! Provides the [`Transport`] and [`Connection`] traits, a framed TCP
//! implementation of both, and the shutdown signal shared by the accept
//! loops of the identity and session servers.
//!
//! Two wire dialects are supported, selected by [`WireFormat`]:
//!
//! - `Legacy`: byte-compatible with unmodified legacy clients. A request
//!   ends at the first `}` byte; responses are written raw.
//! - `LengthPrefixed` (default): every frame is preceded by a 4-byte
//!   big-endian length.

#![allow(async_fn_in_trait)]

mod error;
mod framing;
pub mod shutdown;
mod tcp;

pub use error::TransportError;
pub use framing::{
    DEFAULT_MAX_FRAME_LEN, FrameDecoder, FramePair, Framing, WireFormat,
};
pub use shutdown::{Shutdown, ShutdownTrigger, drain};
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops accepting new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that exchanges whole frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next complete frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly between frames.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the write side of the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
        assert_eq!(id.into_inner(), 7);
    }

    #[test]
    fn test_connection_id_ordering_follows_raw_value() {
        let mut ids = vec![ConnectionId::new(3), ConnectionId::new(1)];
        ids.sort();
        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(3)]);
    }
}
