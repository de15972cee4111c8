//! Control-plane HTTP handlers.

mod cluster;
mod daemon;
mod health;

pub use cluster::{join_handler, metasync_handler};
pub use daemon::daemon_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use crate::cluster::Gateway;
use crate::network::ShutdownController;

/// Shared state passed to all handlers via `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    /// Gateway runtime: identity, metadata owners, started flag.
    pub gw: Arc<Gateway>,
    /// Shutdown controller for health state.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, for uptime reporting.
    pub start_time: Instant,
}
