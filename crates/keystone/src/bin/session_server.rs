use clap::Parser;
use keystone::KeystoneError;
use keystone::cli::SessionArgs;
use keystone::session::SessionServer;
use keystone::telemetry::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), KeystoneError> {
    let args = SessionArgs::parse();
    init_tracing()?;

    let config = args.into_config();
    tracing::info!(
        bind = %config.bind_addr,
        identity = %config.identity_addr,
        data_file = ?config.data_file,
        "starting session service"
    );

    let server = SessionServer::builder().config(config).build().await?;
    server.run_until(shutdown_signal()).await?;
    Ok(())
}
