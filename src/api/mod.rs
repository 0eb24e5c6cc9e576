//! Ambient health/metrics surface (spec §9, "Ambient concerns"). This is
//! deliberately thin — `/healthz` and `/metrics` only. The dashboard's own
//! business-data API (device lists, alert history, topology) is out of
//! scope here.

pub mod health;
pub mod metrics;

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::background::SystemHealth;
use crate::queue::QueueBroker;
use tokio::sync::RwLock;

/// Shared state the ambient endpoints read from. Never business data —
/// just what a liveness/readiness probe or a Prometheus scrape needs.
pub struct ApiState {
    pub health: Arc<RwLock<SystemHealth>>,
    pub queues: Arc<QueueBroker>,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(health::get_health))
        .route("/metrics", axum::routing::get(metrics::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
