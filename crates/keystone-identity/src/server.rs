//! `IdentityServer` builder and accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keystone_protocol::RecordFile;
use keystone_transport::{TcpTransport, Transport, shutdown};
use tokio::task::JoinSet;

use crate::handler::handle_connection;
use crate::{
    Account, AccountStore, BcryptHasher, IdentityConfig, IdentityServerError,
    IdentityService,
};

/// Builder for configuring and starting the Identity Service.
///
/// # Example
///
/// ```rust,ignore
/// let server = IdentityServer::builder()
///     .config(IdentityConfig::default().bind("0.0.0.0:8080"))
///     .build()
///     .await?;
/// server.run_until(tokio::signal::ctrl_c()).await
/// ```
#[derive(Debug, Default)]
pub struct IdentityServerBuilder {
    config: IdentityConfig,
}

impl IdentityServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: IdentityConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for overriding just the bind address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Loads persisted accounts, seeds the admin, and binds the listener.
    pub async fn build(self) -> Result<IdentityServer, IdentityServerError> {
        let config = self.config;

        let mut store = AccountStore::new(
            BcryptHasher::new(config.hash_cost),
            config.tokens.build(),
            config.connection_limits,
            config.energy_cost,
        );
        let records = config.data_file.clone().map(RecordFile::new);
        if let Some(file) = &records {
            store.restore(file.load::<Account>()?);
        }
        store.ensure_admin(&config.admin.username, &config.admin.password)?;
        tracing::info!(accounts = store.len(), "account store ready");

        let transport =
            TcpTransport::bind(&config.bind_addr, config.wire).await?;

        Ok(IdentityServer {
            transport,
            service: Arc::new(IdentityService::new(store)),
            records,
            drain_timeout: config.drain_timeout,
            idle_timeout: config.idle_timeout,
        })
    }
}

/// A bound Identity Service, ready to accept connections.
pub struct IdentityServer {
    transport: TcpTransport,
    service: Arc<IdentityService>,
    records: Option<RecordFile>,
    drain_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl IdentityServer {
    pub fn builder() -> IdentityServerBuilder {
        IdentityServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The shared service state, for inspection.
    pub fn service(&self) -> Arc<IdentityService> {
        Arc::clone(&self.service)
    }

    /// Accepts connections until `signal` resolves, then shuts down.
    ///
    /// Shutdown order: stop accepting, tell every connection to finish,
    /// wait up to the drain timeout, abort stragglers, and only then save
    /// the accounts.
    pub async fn run_until(
        mut self,
        signal: impl Future<Output = ()>,
    ) -> Result<(), IdentityServerError> {
        let local = self.local_addr().ok();
        tracing::info!(addr = ?local, "identity service running");

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

        tracing::info!(open = tasks.len(), "identity service shutting down");
        trigger.trigger();
        let _ = self.transport.shutdown().await;
        shutdown::drain(&mut tasks, self.drain_timeout).await;

        if let Some(file) = &self.records {
            file.save(&self.service.records().await)?;
        }
        tracing::info!("identity service shutdown complete");
        Ok(())
    }
}
