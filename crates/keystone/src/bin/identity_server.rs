use clap::Parser;
use keystone::KeystoneError;
use keystone::cli::IdentityArgs;
use keystone::identity::IdentityServer;
use keystone::telemetry::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), KeystoneError> {
    let args = IdentityArgs::parse();
    init_tracing()?;

    let config = args.into_config();
    tracing::info!(bind = %config.bind_addr, data_file = ?config.data_file, "starting identity service");

    let server = IdentityServer::builder().config(config).build().await?;
    server.run_until(shutdown_signal()).await?;
    Ok(())
}
