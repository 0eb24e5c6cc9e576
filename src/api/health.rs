//! Liveness/readiness endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::ApiState;
use crate::background::HealthStatus;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub check_cycles: u64,
    pub components: Vec<ComponentStatus>,
}

#[derive(Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub status: String,
}

pub async fn get_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let health = state.health.read().await;
    let status = match health.overall {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded { .. } => "degraded",
        HealthStatus::Unhealthy { .. } => "unhealthy",
    };

    Json(HealthResponse {
        status,
        check_cycles: health.check_cycles,
        components: health
            .components
            .iter()
            .map(|c| ComponentStatus {
                name: c.name.clone(),
                status: c.status.to_string(),
            })
            .collect(),
    })
}
