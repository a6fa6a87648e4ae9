//! Huruf Session Server
//!
//! Serves the session creation endpoint and the WebSocket game protocol.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use huruf::{network::auth::AuthConfig, GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("huruf=info")),
        )
        .init();

    info!("Huruf Server v{}", VERSION);

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let auth = AuthConfig::from_env();
    info!(
        http = %config.http_addr,
        ws = %config.ws_addr,
        data_dir = ?config.data_dir,
        guarded = auth.is_configured(),
        "configuration loaded"
    );

    let server = Arc::new(GameServer::new(config, auth).context("failed to build server")?);

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                signal_server.shutdown();
            }
            Err(e) => error!("failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await.context("server stopped with an error")?;
    info!("server stopped");
    Ok(())
}
