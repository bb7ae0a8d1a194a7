//! `SessionServer` builder and accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keystone_protocol::RecordFile;
use keystone_transport::{TcpTransport, Transport, shutdown};
use tokio::task::JoinSet;

use crate::handler::handle_connection;
use crate::{
    Catalog, IdentityDirectory, IdentityRpcClient, PlayerState, Roster,
    SessionConfig, SessionServerError, SessionService,
};

/// Builder for configuring and starting the Session Service.
///
/// # Example
///
/// ```rust,ignore
/// let server = SessionServer::builder()
///     .config(SessionConfig::default().identity_addr("10.0.0.5:8080"))
///     .build()
///     .await?;
/// server.run_until(tokio::signal::ctrl_c()).await
/// ```
#[derive(Debug, Default)]
pub struct SessionServerBuilder {
    config: SessionConfig,
    catalog: Option<Catalog>,
}

impl SessionServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for overriding just the bind address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the built-in item catalog.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Builds a server that talks to the Identity Service over TCP.
    ///
    /// A failed first connection is logged, not fatal: the client
    /// reconnects on the first request that needs it.
    pub async fn build(self) -> Result<SessionServer<IdentityRpcClient>, SessionServerError> {
        let client = IdentityRpcClient::new(&self.config.identity_addr, self.config.wire);
        if let Err(e) = client.connect().await {
            tracing::warn!(addr = %client.addr(), error = %e, "identity service not reachable yet");
        }
        self.build_with(Arc::new(client)).await
    }

    /// Builds a server around any [`IdentityDirectory`].
    pub async fn build_with<D: IdentityDirectory>(
        self,
        directory: Arc<D>,
    ) -> Result<SessionServer<D>, SessionServerError> {
        let config = self.config;

        let mut roster = Roster::new(
            config.inventory_capacity,
            self.catalog.unwrap_or_default(),
        );
        let records = config.data_file.clone().map(RecordFile::new);
        if let Some(file) = &records {
            roster.restore(file.load::<PlayerState>()?);
        }
        roster.ensure_admin(&config.admin_username);
        tracing::info!(players = roster.len(), "roster ready");

        let transport = TcpTransport::bind(&config.bind_addr, config.wire).await?;

        Ok(SessionServer {
            transport,
            service: Arc::new(SessionService::new(
                directory,
                config.tokens.build(),
                roster,
                config.admin_bypass_capacity,
            )),
            records,
            drain_timeout: config.drain_timeout,
            idle_timeout: config.idle_timeout,
        })
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Admitted connections.
    pub connections: u32,
    /// Distinct online usernames.
    pub online: usize,
    /// Known players, online or not.
    pub players: usize,
}

/// A bound Session Service, ready to accept connections.
pub struct SessionServer<D = IdentityRpcClient> {
    transport: TcpTransport,
    service: Arc<SessionService<D>>,
    records: Option<RecordFile>,
    drain_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl SessionServer {
    pub fn builder() -> SessionServerBuilder {
        SessionServerBuilder::new()
    }
}

impl<D: IdentityDirectory> SessionServer<D> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The shared service state, for inspection.
    pub fn service(&self) -> Arc<SessionService<D>> {
        Arc::clone(&self.service)
    }

    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            connections: self.service.connection_count().await,
            online: self.service.online_users().await.len(),
            players: self.service.records().await.len(),
        }
    }

    /// Accepts connections until `signal` resolves, then shuts down.
    ///
    /// Shutdown order: stop accepting, tell every connection to finish,
    /// wait up to the drain timeout, abort stragglers, and only then save
    /// the players.
    pub async fn run_until(
        mut self,
        signal: impl Future<Output = ()>,
    ) -> Result<(), SessionServerError> {
        let local = self.local_addr().ok();
        tracing::info!(addr = ?local, "session service running");

        let (trigger, listener) = shutdown::channel();
        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        tasks.spawn(handle_connection(
                            conn,
                            Arc::clone(&self.service),
                            listener.clone(),
                            self.idle_timeout,
                        ));
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Err(e)) => tracing::debug!(error = %e, "connection ended with error"),
                        Err(e) if e.is_panic() => tracing::error!(error = %e, "connection task panicked"),
                        _ => {}
                    }
                }
            }
        }

        tracing::info!(open = tasks.len(), "session service shutting down");
        trigger.trigger();
        let _ = self.transport.shutdown().await;
        shutdown::drain(&mut tasks, self.drain_timeout).await;

        if let Some(file) = &self.records {
            file.save(&self.service.records().await)?;
        }
        tracing::info!("session service shutdown complete");
        Ok(())
    }
}
