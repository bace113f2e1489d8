mod api;
mod config;
mod mdns;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::mdns::scanner::Scanner;
use crate::mdns::transport::MulticastTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hearth_discoveryd=info")),
        )
        .init();

    tracing::info!("Starting hearth-discoveryd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/hearth/discoveryd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // One multicast listener, shared by every scan
    let transport = MulticastTransport::bind().context("Failed to open the mDNS transport")?;
    let recv_cancel = cancel.clone();
    let recv_transport = transport.clone();
    let transport_handle = tokio::spawn(async move {
        recv_transport.run(recv_cancel).await;
    });

    let scanner = Arc::new(Scanner::new(transport, &config.discovery));

    // Build API router
    let app = api::routes::router(api::routes::AppState { scanner });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation and wait for tasks to finish
    cancel.cancel();
    let _ = tokio::join!(transport_handle, server_handle);

    tracing::info!("Shutdown complete");
    Ok(())
}
