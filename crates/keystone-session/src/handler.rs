//! Per-connection handler for the Session Service.
//!
//! Same shape as the Identity Service's handler, plus admission: the
//! first request that carries a username and a valid token is run through
//! the [`AdmissionController`](crate::AdmissionController) and, if
//! admitted, dispatched like any other. Until then every request gets
//! "Please authenticate first". A rejection is sent and the connection
//! closed.

use std::sync::Arc;
use std::time::Duration;

use keystone_protocol::{Codec, JsonCodec, Request, Response, ServiceError};
use keystone_transport::{Connection, Shutdown, TcpConnection, TransportError};

use crate::{ConnectionSession, IdentityDirectory, SessionServerError, SessionService};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<D: IdentityDirectory>(
    conn: TcpConnection,
    service: Arc<SessionService<D>>,
    mut shutdown: Shutdown,
    idle_timeout: Option<Duration>,
) -> Result<(), SessionServerError> {
    let mut session = ConnectionSession::new(conn.id());
    tracing::debug!(conn_id = %session.conn_id, peer = %conn.peer_addr(), "session connection opened");

    let result = serve(&conn, &service, &mut session, &mut shutdown, idle_timeout).await;

    service.close(&mut session).await;
    let _ = conn.close().await;
    tracing::debug!(
        conn_id = %session.conn_id,
        username = session.username.as_deref().unwrap_or("-"),
        open_for = ?session.connected_at.elapsed(),
        "session connection closed"
    );
    result
}

async fn serve<D: IdentityDirectory>(
    conn: &TcpConnection,
    service: &SessionService<D>,
    session: &mut ConnectionSession,
    shutdown: &mut Shutdown,
    idle_timeout: Option<Duration>,
) -> Result<(), SessionServerError> {
    let conn_id = session.conn_id;
    loop {
        let frame = tokio::select! {
            _ = shutdown.wait() => {
                tracing::debug!(%conn_id, "closing connection for shutdown");
                return Ok(());
            }
            frame = recv_frame(conn, idle_timeout) => frame,
        };

        let data = match frame {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "connection ended");
                return Ok(());
            }
        };

        let request: Request = match JsonCodec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode request");
                Request::default()
            }
        };

        if !session.is_admitted() {
            match service
                .admit(session, &request.username, request.token_str())
                .await
            {
                Ok(_) => {}
                Err(ServiceError::Unauthenticated) => {
                    send(conn, &ServiceError::Unauthenticated.into_response()).await?;
                    continue;
                }
                Err(rejection) => {
                    send(conn, &rejection.into_response()).await?;
                    return Ok(());
                }
            }
        }

        let response = service.dispatch(session, request).await;
        send(conn, &response).await?;
    }
}

async fn send(conn: &TcpConnection, response: &Response) -> Result<(), SessionServerError> {
    let bytes = JsonCodec.encode(response)?;
    conn.send(&bytes).await?;
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
