//! Prometheus text-format metrics for the four queue depths (spec §9).
//! No authentication — scraped by Prometheus without per-request
//! credentials, matching the teacher's own unauthenticated metrics route.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;

use super::ApiState;

pub async fn get_metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let alerts = state.queues.alerts.depth();
    let monitoring = state.queues.monitoring.depth();
    let snmp = state.queues.snmp.depth();
    let maintenance = state.queues.maintenance.depth();

    let mut body = String::with_capacity(512);
    body.push_str("# HELP fleetwatch_queue_depth Tasks currently buffered per queue\n");
    body.push_str("# TYPE fleetwatch_queue_depth gauge\n");
    body.push_str(&format!("fleetwatch_queue_depth{{queue=\"alerts\"}} {alerts}\n"));
    body.push_str(&format!("fleetwatch_queue_depth{{queue=\"monitoring\"}} {monitoring}\n"));
    body.push_str(&format!("fleetwatch_queue_depth{{queue=\"snmp\"}} {snmp}\n"));
    body.push_str(&format!("fleetwatch_queue_depth{{queue=\"maintenance\"}} {maintenance}\n"));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
