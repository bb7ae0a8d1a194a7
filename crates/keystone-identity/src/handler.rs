//! Per-connection handler for the Identity Service.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The loop is strictly sequential: receive one
//! frame, decode, dispatch, send the response, repeat.

use std::sync::Arc;
use std::time::Duration;

use keystone_protocol::{Codec, JsonCodec, Request};
use keystone_transport::{Connection, Shutdown, TcpConnection, TransportError};

use crate::{CredentialHasher, IdentityServerError, IdentityService};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<H: CredentialHasher>(
    conn: TcpConnection,
    service: Arc<IdentityService<H>>,
    mut shutdown: Shutdown,
    idle_timeout: Option<Duration>,
) -> Result<(), IdentityServerError> {
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::debug!(%conn_id, %peer, "identity connection opened");

    loop {
        let frame = tokio::select! {
            _ = shutdown.wait() => {
                tracing::debug!(%conn_id, "closing connection for shutdown");
                break;
            }
            frame = recv_frame(&conn, idle_timeout) => frame,
        };

        let data = match frame {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "connection ended");
                break;
            }
        };

        // An undecodable request is answered like an empty one:
        // "Unknown action: ".
        let request: Request = JsonCodec.decode(&data).unwrap_or_else(|e| {
            tracing::debug!(%conn_id, error = %e, "failed to decode request");
            Request::default()
        });

        let response = service.dispatch(request).await;
        let bytes = JsonCodec.encode(&response)?;
        conn.send(&bytes).await?;
    }

    let _ = conn.close().await;
    Ok(())
}

async fn recv_frame(
    conn: &TcpConnection,
    idle_timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, TransportError> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, conn.recv())
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => conn.recv().await,
    }
}
