/// Errors that can occur in the transport layer.
///
/// Every variant terminates only the connection it was raised on. The
/// accept loop logs it and keeps serving everyone else.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer reset or aborted the connection.
    #[error("connection reset by peer: {0}")]
    PeerReset(#[source] std::io::Error),

    /// The peer closed the stream in the middle of a frame.
    #[error("peer closed the connection mid-frame")]
    PeerClosed,

    /// A socket operation timed out (idle clients, stalled peers).
    #[error("operation timed out")]
    Timeout,

    /// The remote service could not be reached at all.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A frame grew past the configured size limit.
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Maps a socket read error onto the transport taxonomy.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::PeerReset(err),
            ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::UnexpectedEof => Self::PeerClosed,
            _ => Self::ReceiveFailed(err),
        }
    }

    /// Maps a socket write error onto the transport taxonomy.
    pub(crate) fn from_write(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::PeerReset(err),
            ErrorKind::TimedOut => Self::Timeout,
            _ => Self::SendFailed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::*;

    #[test]
    fn test_from_read_connection_reset_is_peer_reset() {
        let err = TransportError::from_read(Error::from(ErrorKind::ConnectionReset));
        assert!(matches!(err, TransportError::PeerReset(_)));
    }

    #[test]
    fn test_from_read_timed_out_is_timeout() {
        let err = TransportError::from_read(Error::from(ErrorKind::TimedOut));
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn test_from_write_other_is_send_failed() {
        let err = TransportError::from_write(Error::from(ErrorKind::Other));
        assert!(matches!(err, TransportError::SendFailed(_)));
    }
}
