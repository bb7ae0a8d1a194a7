//! Resilient client for the Identity Service.
//!
//! One logical connection, shared by every session task. A request holds
//! the connection lock for its whole round trip, so requests from
//! different tasks are serialized rather than interleaved on the wire.
//!
//! Failure policy, implemented once in [`IdentityRpcClient::call`]:
//!
//! ```text
//! send ── response ──────────────────────────────→ Ok
//!   └─ nothing, connection invalid
//!        └─ reconnect ── send ── response ───────→ Ok
//!                          └─ nothing ───────────→ Unreachable
//! ```
//!
//! No backoff, no queueing, no timeout on the round trip itself.

use keystone_protocol::{
    AccountInfo, AccountRemoval, Codec, EnergyReceipt, JsonCodec, Request,
    Response, TierChange,
};
use keystone_transport::{Connection, TcpConnection, WireFormat};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::{DirectoryError, IdentityDirectory};

/// The Session Service's connection to the Identity Service.
pub struct IdentityRpcClient {
    addr: String,
    wire: WireFormat,
    /// `None` means disconnected or invalidated by a failed round trip.
    conn: Mutex<Option<TcpConnection>>,
}

impl IdentityRpcClient {
    /// Creates a client. No connection is made until the first request
    /// (or an explicit [`connect`](Self::connect)).
    pub fn new(addr: impl Into<String>, wire: WireFormat) -> Self {
        Self {
            addr: addr.into(),
            wire,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Opens the connection if it isn't already open.
    pub async fn connect(&self) -> Result<(), DirectoryError> {
        let mut slot = self.conn.lock().await;
        if slot.is_none() {
            *slot = Some(self.open().await?);
        }
        Ok(())
    }

    /// Closes the connection, if any.
    pub async fn disconnect(&self) {
        let old = self.conn.lock().await.take();
        if let Some(conn) = old {
            let _ = conn.close().await;
            tracing::info!(addr = %self.addr, "disconnected from identity service");
        }
    }

    /// Drops the current connection and opens a fresh one.
    pub async fn reconnect(&self) -> Result<(), DirectoryError> {
        tracing::info!(addr = %self.addr, "reconnecting to identity service");
        let mut slot = self.conn.lock().await;
        if let Some(old) = slot.take() {
            let _ = old.close().await;
        }
        *slot = Some(self.open().await?);
        Ok(())
    }

    /// Returns `true` while a usable connection is held.
    pub async fn is_valid(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// One round trip, no retries.
    ///
    /// Returns `None` if there is no connection or the exchange failed; a
    /// failed exchange also invalidates the connection.
    pub async fn send(&self, request: &Request) -> Option<Response> {
        let mut slot = self.conn.lock().await;
        let conn = slot.as_ref()?;

        let outcome = match JsonCodec.encode(request) {
            Ok(bytes) => match conn.send(&bytes).await {
                Ok(()) => conn.recv().await,
                Err(e) => Err(e),
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to encode identity request");
                return None;
            }
        };

        let reply = match outcome {
            Ok(Some(bytes)) => JsonCodec.decode::<Response>(&bytes).map_err(|e| {
                tracing::warn!(error = %e, "undecodable identity response");
            }),
            Ok(None) => {
                tracing::warn!("identity service closed the connection");
                Err(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity round trip failed");
                Err(())
            }
        };

        match reply {
            Ok(response) => Some(response),
            Err(()) => {
                // The stream may be mid-frame; never reuse it.
                *slot = None;
                None
            }
        }
    }

    /// [`send`](Self::send) with the single reconnect-and-retry policy.
    pub async fn call(&self, request: &Request) -> Result<Response, DirectoryError> {
        if let Some(response) = self.send(request).await {
            return Ok(response);
        }
        if !self.is_valid().await {
            if let Err(e) = self.reconnect().await {
                tracing::warn!(error = %e, action = %request.action, "identity service unreachable");
                return Err(DirectoryError::Unreachable);
            }
            if let Some(response) = self.send(request).await {
                return Ok(response);
            }
        }
        tracing::warn!(action = %request.action, "identity service unreachable after retry");
        Err(DirectoryError::Unreachable)
    }

    /// Calls and unpacks a successful response's `data` as `T`.
    async fn call_for<T: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Result<T, DirectoryError> {
        let response = self.call(&request).await?;
        if !response.success {
            return Err(DirectoryError::Rejected {
                message: response.message,
                data: response.data,
            });
        }
        response.data_as().ok_or(DirectoryError::Malformed)
    }

    async fn open(&self) -> Result<TcpConnection, DirectoryError> {
        match TcpConnection::connect(&self.addr, self.wire).await {
            Ok(conn) => {
                tracing::info!(addr = %self.addr, "connected to identity service");
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(addr = %self.addr, error = %e, "failed to connect to identity service");
                Err(DirectoryError::Unreachable)
            }
        }
    }
}

impl IdentityDirectory for IdentityRpcClient {
    async fn account_info(
        &self,
        username: &str,
        token: &str,
    ) -> Result<AccountInfo, DirectoryError> {
        self.call_for(Request::new("get_user_info", username).with_token(token))
            .await
    }

    async fn debit_energy(
        &self,
        username: &str,
        token: &str,
    ) -> Result<EnergyReceipt, DirectoryError> {
        self.call_for(Request::new("check_energy", username).with_token(token))
            .await
    }

    async fn change_tier(
        &self,
        acting: &str,
        token: &str,
        target: &str,
        new_tier: &str,
    ) -> Result<TierChange, DirectoryError> {
        self.call_for(
            Request::new("modify_type", acting)
                .with_token(token)
                .with_target(target)
                .with_new_type(new_tier),
        )
        .await
    }

    async fn remove_account(
        &self,
        acting: &str,
        token: &str,
        target: &str,
    ) -> Result<AccountRemoval, DirectoryError> {
        self.call_for(
            Request::new("remove_user", acting)
                .with_token(token)
                .with_target(target),
        )
        .await
    }
}
