//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Observed pending nonces
//! - Stuck wallet counts
//! - Check and fetch failure rates

use crate::error::{NonceError, NonceResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "nonce_watch_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Wallet metrics
    pub static ref PENDING_NONCE: GaugeVec = register_gauge_vec!(
        "nonce_watch_pending_nonce",
        "Last observed pending nonce per wallet",
        &["chain_id", "wallet"]
    ).unwrap();

    pub static ref STUCK_WALLETS: GaugeVec = register_gauge_vec!(
        "nonce_watch_stuck_wallets",
        "Wallets with stuck transactions in the last check",
        &["chain_id"]
    ).unwrap();

    pub static ref CHECKS: CounterVec = register_counter_vec!(
        "nonce_watch_checks_total",
        "Total wallet checks performed",
        &["chain_id"]
    ).unwrap();

    pub static ref FETCH_FAILURES: CounterVec = register_counter_vec!(
        "nonce_watch_fetch_failures_total",
        "Total nonce fetches that exhausted their attempts",
        &["chain_id"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> NonceResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NonceError::Server(format!("bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| NonceError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Encode all registered metrics in the Prometheus text format
pub fn render() -> NonceResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| NonceError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| NonceError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_pending_nonce(chain_id: u64, wallet: &str, nonce: u64) {
    PENDING_NONCE
        .with_label_values(&[&chain_id.to_string(), wallet])
        .set(nonce as f64);
}

pub fn record_stuck_wallets(chain_id: u64, count: usize) {
    STUCK_WALLETS
        .with_label_values(&[&chain_id.to_string()])
        .set(count as f64);
}

pub fn record_check(chain_id: u64) {
    CHECKS.with_label_values(&[&chain_id.to_string()]).inc();
}

pub fn record_fetch_failure(chain_id: u64) {
    FETCH_FAILURES
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}
