//! Nonce Watch - keeps an eye on wallet nonces across EVM chains
//!
//! Periodically reads the pending nonce of every configured wallet and flags
//! wallets whose pending transactions appear stuck.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{error, info};

use nonce_watch::api::{self, AppState};
use nonce_watch::chain::{ChainManager, ChainReader};
use nonce_watch::config::Settings;
use nonce_watch::metrics::MetricsServer;
use nonce_watch::nonce::{create_nonce_fetcher, NonceLogger, TracingLogger};
use nonce_watch::watch::{ChainTarget, NonceWatcher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Nonce Watch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let wallets = settings.wallet_addresses()?;
    info!(
        "Loaded configuration for {} chains and {} wallets",
        settings.enabled_chains().len(),
        wallets.len()
    );

    // Initialize chain manager (handles all chain connections)
    let chain_manager = Arc::new(ChainManager::new(&settings)?);
    info!("Chain connections initialized");

    // One fetcher per chain, all logging through tracing
    let logger: Arc<dyn NonceLogger> = Arc::new(TracingLogger::new("nonce_fetcher"));
    let mut targets = Vec::new();
    for chain_id in chain_manager.connected_chains() {
        let reader: Arc<dyn ChainReader> = chain_manager.get_provider(chain_id)?;
        targets.push(ChainTarget {
            chain_id,
            fetcher: create_nonce_fetcher(reader, logger.clone()),
        });
    }

    let watcher = Arc::new(NonceWatcher::new(
        targets,
        wallets,
        settings.watcher.max_attempts,
        Duration::from_secs(settings.watcher.poll_interval_secs),
    ));

    // Start API server
    let api_handle = tokio::spawn({
        let state = AppState {
            chain_manager: chain_manager.clone(),
            watcher: watcher.clone(),
            started_at: Instant::now(),
        };
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start watcher
    let watcher_handle = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run().await }
    });

    info!("Nonce Watch is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    watcher.stop().await;

    // Abort background tasks
    api_handle.abort();
    watcher_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Nonce Watch stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nonce_watch=debug,hyper=warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
