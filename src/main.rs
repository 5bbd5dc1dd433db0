mod api;
mod data;
mod config;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use log::{info, warn, error};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::data::{spawn_cleanup_task, DataFile, MarketController, Publisher, StockMarket};
use crate::api::{admin_prefix, create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    // Log configuration
    config.log_config();

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    // Round data is required before serving anything
    let market = match StockMarket::new(Box::new(DataFile(config.data_file.clone().into()))) {
        Ok(market) => market,
        Err(e) => {
            error!("Failed to load round data from {}: {}", config.data_file, e);
            return Err(e.into());
        }
    };
    info!("📊 Loaded {} rounds", market.len());

    let publisher = Arc::new(Publisher::new(config.subscriber_settings()));
    let controller = Arc::new(MarketController::new(market, publisher.clone()));

    // Start background cleanup
    let shutdown_token = CancellationToken::new();
    let cleanup_handle = spawn_cleanup_task(
        publisher.clone(),
        config.cleanup_interval(),
        config.subscriber_timeout(),
        shutdown_token.clone(),
    );

    let router = create_router(AppState { controller }, &config.admin_secret)
        .layer(CorsLayer::permissive()); // Enable CORS for web clients

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("🌐 Market feed running at http://{}", config.bind_address);
    info!("🔗 Viewer stream: http://{}/stream", config.bind_address);
    info!("👑 Secret admin url is {}", admin_prefix(&config.admin_secret));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone(), publisher.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    match tokio::time::timeout(Duration::from_secs(10), cleanup_handle).await {
        Ok(Ok(())) => info!("🧹 Cleanup task stopped"),
        Ok(Err(e)) if e.is_cancelled() => info!("🧹 Cleanup task cancelled"),
        Ok(Err(e)) => error!("Cleanup task failed: {}", e),
        Err(_) => warn!("Cleanup task did not stop in time"),
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then stop background work and evict every
/// subscriber so open streams end and graceful shutdown can complete.
async fn shutdown_signal(shutdown_token: CancellationToken, publisher: Arc<Publisher>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => warn!("Received SIGTERM, initiating graceful shutdown..."),
    }

    shutdown_token.cancel();
    match publisher.cleanup_stale_subscribers(Duration::ZERO) {
        Ok(count) => info!("Closed {} subscriber streams", count),
        Err(e) => error!("Failed to evict subscribers on shutdown: {}", e),
    }
}
