//! Daemon introspection handler: `GET /v1/daemon?what=...`.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use reefstore_core::messages::{QPARAM_WHAT, WHAT_SMAP_VOTE};

use super::AppState;

/// Serves `what=smap-vote`: this node's current cluster map, bucket
/// metadata, and reelection flag.
///
/// Unknown `what` values are a client error, not a crash: discovery from a
/// newer node may probe options this build does not know.
pub async fn daemon_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match params.get(QPARAM_WHAT).map(String::as_str) {
        Some(WHAT_SMAP_VOTE) => Json(state.gw.vote_reply()).into_response(),
        Some(other) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown what={other}") })),
        )
            .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("missing {QPARAM_WHAT} parameter") })),
        )
            .into_response(),
    }
}
