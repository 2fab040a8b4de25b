//! HTTP API for health checks, status, and wallet inspection

use crate::chain::ChainManager;
use crate::config::ApiConfig;
use crate::error::{NonceError, NonceResult};
use crate::watch::{NonceWatcher, WalletStatus};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chain_manager: Arc<ChainManager>,
    pub watcher: Arc<NonceWatcher>,
    pub started_at: Instant,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/wallets", get(get_wallets))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> NonceResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NonceError::Server(format!("bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| NonceError::Server(e.to_string()))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - every chain has a reachable RPC
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let chain_health = state.chain_manager.health_check().await;
    let ready = chain_health.iter().all(|(_, healthy)| *healthy);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            details: chain_health
                .into_iter()
                .map(|(id, h)| ChainHealth {
                    chain_id: id,
                    healthy: h,
                })
                .collect(),
        }),
    )
}

/// Get watcher status
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        chains: state
            .chain_manager
            .chains()
            .into_iter()
            .map(|(chain_id, name)| ChainInfo { chain_id, name })
            .collect(),
        wallets_checked: state.watcher.statuses().len(),
        stuck_wallets: state.watcher.stuck_count(),
    })
}

/// Latest check result for every wallet
async fn get_wallets(State(state): State<AppState>) -> Json<Vec<WalletStatus>> {
    Json(state.watcher.statuses())
}

// Response types

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub details: Vec<ChainHealth>,
}

#[derive(Serialize, Deserialize)]
pub struct ChainHealth {
    pub chain_id: u64,
    pub healthy: bool,
}

#[derive(Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: u64,
    pub name: String,
}

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub chains: Vec<ChainInfo>,
    pub wallets_checked: usize,
    pub stuck_wallets: usize,
}
