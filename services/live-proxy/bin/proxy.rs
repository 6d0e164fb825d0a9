//! Main Entrypoint for the Live API Relay
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Choosing where upstream access tokens come from.
//! 3. Constructing the Axum router.
//! 4. Starting the server and handling graceful shutdown.

use anyhow::Context;
use live_proxy::{
    config::Config,
    router::create_router,
    state::AppState,
    token::{GcloudToken, StaticToken, TokenSource},
};
use std::sync::Arc;
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C.");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded.");

    // --- 3. Token Source ---
    let token_source: Arc<dyn TokenSource> = match &config.access_token {
        Some(token) => {
            info!("Using the access token from ACCESS_TOKEN.");
            Arc::new(StaticToken::new(token.clone()))
        }
        None => {
            info!(program = %config.gcloud_path, "Access tokens will be generated with gcloud.");
            Arc::new(GcloudToken::new(config.gcloud_path.clone()))
        }
    };

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        token_source,
    });

    // --- 4. Start Server ---
    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!(
        bind_address = %config.bind_address,
        service_url = %config.service_url,
        "Relay listening."
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
