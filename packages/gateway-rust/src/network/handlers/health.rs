//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the body distinguishes "up but still
/// bootstrapping" from "up and serving".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cmap = state.gw.cmap().get();
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "started": state.gw.started(),
        "node_id": state.gw.self_node().id.clone(),
        "cmap_version": cmap.version,
        "cmap_uuid": cmap.uuid.clone(),
        "primary_id": cmap.primary_id.clone(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe -- always 200 while the process responds.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 only once the listener is up AND bootstrap has
/// completed.
///
/// Control-plane ceremonies (join, metasync, smap-vote) do not go through
/// readiness: a primary candidate must accept registrations before it is
/// "ready".
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready && state.gw.started() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
