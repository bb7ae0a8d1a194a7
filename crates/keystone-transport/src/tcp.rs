//! Framed TCP transport using `tokio::net`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{
    Connection, ConnectionId, DEFAULT_MAX_FRAME_LEN, FrameDecoder, FramePair,
    Framing, Transport, TransportError, WireFormat,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Size of the scratch buffer used for each socket read.
const READ_CHUNK: usize = 4096;

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    framing: FramePair,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(
        addr: &str,
        wire: WireFormat,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, ?wire, "TCP transport listening");
        Ok(Self {
            listener,
            framing: wire.server_framing(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Overrides the largest frame accepted from clients.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Returns the address the listener is actually bound to.
    ///
    /// Useful after binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        // Requests and responses are small and latency-bound.
        let _ = stream.set_nodelay(true);

        let conn = TcpConnection::from_stream(
            stream,
            addr,
            self.framing,
            self.max_frame_len,
        );
        tracing::debug!(id = %conn.id(), %addr, "accepted TCP connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Read side of a connection: the socket half plus its frame buffer.
struct FramedReader {
    half: OwnedReadHalf,
    decoder: FrameDecoder,
}

/// A single framed TCP connection, usable from either side.
///
/// Reads and writes are guarded by separate locks so a task can wait for
/// the next frame while another sends.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<FramedReader>,
    writer: Mutex<OwnedWriteHalf>,
    outbound: Framing,
}

impl TcpConnection {
    /// Wraps an already-established stream.
    pub fn from_stream(
        stream: TcpStream,
        peer: SocketAddr,
        framing: FramePair,
        max_frame_len: usize,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            id: ConnectionId::new(
                NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            ),
            peer,
            reader: Mutex::new(FramedReader {
                half: read_half,
                decoder: FrameDecoder::new(framing.inbound, max_frame_len),
            }),
            writer: Mutex::new(write_half),
            outbound: framing.outbound,
        }
    }

    /// Opens a client connection to a Keystone service.
    ///
    /// # Errors
    /// [`TransportError::Unreachable`] if the TCP connect fails.
    pub async fn connect(
        addr: &str,
        wire: WireFormat,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Unreachable(format!("{addr}: {e}")))?;
        let _ = stream.set_nodelay(true);
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::Unreachable(format!("{addr}: {e}")))?;
        Ok(Self::from_stream(
            stream,
            peer,
            wire.client_framing(),
            DEFAULT_MAX_FRAME_LEN,
        ))
    }

    /// The remote address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let frame = self.outbound.encode(data)?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(TransportError::from_write)?;
        writer.flush().await.map_err(TransportError::from_write)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = reader.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let n = reader
                .half
                .read(&mut chunk)
                .await
                .map_err(TransportError::from_read)?;
            if n == 0 {
                if reader.decoder.has_partial_frame() {
                    return Err(TransportError::PeerClosed);
                }
                return Ok(None);
            }
            reader.decoder.push(&chunk[..n]);
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::from_write)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
