use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use imgbench_workers::Metrics;
use tokio::net::TcpListener;
use tracing::{error, info};

pub fn create_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(prom_metrics))
        .with_state(metrics)
}

/// Serve health and metrics until the process exits
pub async fn run_server(addr: SocketAddr, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "health/metrics server listening");
    axum::serve(listener, create_router(metrics)).await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn prom_metrics(State(metrics): State<Arc<Metrics>>) -> Result<String, StatusCode> {
    metrics.encode().map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
