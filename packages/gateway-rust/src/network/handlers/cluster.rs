//! Cluster ceremony handlers: registration and metadata distribution.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use reefstore_core::{JoinRequest, JoinResponse, SyncPayload};

use super::AppState;

/// `POST /v1/cluster/join`: a node registering with this gateway.
///
/// Only meaningful on the primary; everyone else answers with a rejection
/// the joiner can act on.
pub async fn join_handler(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> Json<JoinResponse> {
    Json(state.gw.handle_join(req.node))
}

/// `POST /v1/metasync`: primary-distributed metadata.
///
/// Stale versions are ignored silently (204 either way); a uuid mismatch
/// is a conflict the sender must know about.
pub async fn metasync_handler(
    State(state): State<AppState>,
    Json(payload): Json<SyncPayload>,
) -> Response {
    match state.gw.apply_sync(payload) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(mismatch) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": mismatch.to_string() })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use reefstore_core::messages::ACT_PRIMARY_STARTED;
    use reefstore_core::{ClusterMap, Node};

    use crate::cluster::Gateway;
    use crate::config::GatewayConfig;
    use crate::network::ShutdownController;

    fn test_state(id: &str) -> AppState {
        AppState {
            gw: Arc::new(Gateway::new(GatewayConfig {
                node_id: id.to_string(),
                host: "127.0.0.1".to_string(),
                port: 8080,
                ..GatewayConfig::default()
            })),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    fn make_primary(state: &AppState) {
        let mut cmap = ClusterMap::new();
        cmap.set_node(state.gw.self_node().clone());
        cmap.primary_id = state.gw.self_node().id.clone();
        state.gw.cmap().put(cmap);
    }

    #[tokio::test]
    async fn join_on_primary_registers_the_node() {
        let state = test_state("g1");
        make_primary(&state);

        let resp = join_handler(
            State(state.clone()),
            Json(JoinRequest {
                node: Node::target("t1", "http://10.0.0.9:8081"),
            }),
        )
        .await;
        assert!(resp.0.accepted);
        assert_eq!(state.gw.cmap().get().count_targets(), 1);
    }

    #[tokio::test]
    async fn join_on_secondary_is_rejected() {
        let state = test_state("g2");
        let resp = join_handler(
            State(state),
            Json(JoinRequest {
                node: Node::target("t1", "http://10.0.0.9:8081"),
            }),
        )
        .await;
        assert!(!resp.0.accepted);
        assert!(resp.0.reject_reason.is_some());
    }

    #[tokio::test]
    async fn metasync_installs_and_conflicts_map_to_status_codes() {
        let state = test_state("g2");
        let mut cmap = ClusterMap::new();
        cmap.uuid = "UA".to_string();
        cmap.version = 4;
        let response = metasync_handler(
            State(state.clone()),
            Json(SyncPayload {
                action: ACT_PRIMARY_STARTED.to_string(),
                cmap: Some(cmap),
                bmeta: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.gw.cmap().get().version, 4);

        let mut foreign = ClusterMap::new();
        foreign.uuid = "UB".to_string();
        foreign.version = 9;
        let response = metasync_handler(
            State(state.clone()),
            Json(SyncPayload {
                action: ACT_PRIMARY_STARTED.to_string(),
                cmap: Some(foreign),
                bmeta: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.gw.cmap().get().version, 4);
    }
}
