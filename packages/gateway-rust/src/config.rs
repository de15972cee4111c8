//! Gateway configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for a gateway daemon.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Unique identifier of this node within the cluster.
    pub node_id: String,
    /// Bind address for the control-plane listener.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Advertised control URL. When unset, derived from `host`/`port`.
    pub public_url: Option<String>,
    /// Well-known primary control URL to join through when no cluster map
    /// names one.
    pub primary_url: Option<String>,
    /// Directory holding the persisted cluster map. No persistence when
    /// unset.
    pub persist_dir: Option<PathBuf>,
    /// Number of targets a starting primary waits for. 0 means "any".
    pub target_count: usize,
    /// Skip the registration window entirely.
    pub skip_startup: bool,
    /// Maximum in-flight requests per broadcast.
    pub bcast_concurrency: usize,
    pub timeouts: TimeoutConfig,
}

impl GatewayConfig {
    /// The control URL other nodes reach this gateway at.
    #[must_use]
    pub fn ctrl_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Path of the persisted cluster map, when persistence is configured.
    #[must_use]
    pub fn cmap_path(&self) -> Option<PathBuf> {
        self.persist_dir.as_ref().map(|dir| dir.join("cmap.json"))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            host: "0.0.0.0".to_string(),
            port: 0,
            public_url: None,
            primary_url: None,
            persist_dir: None,
            target_count: 0,
            skip_startup: false,
            bcast_concurrency: 16,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Control-plane timing knobs.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Overall budget for the startup sequence; the registration window
    /// and discovery both honor it.
    pub startup: Duration,
    /// Per-request control-plane timeout, also the inter-round discovery
    /// sleep.
    pub cplane_operation: Duration,
    /// Upper bound of the keepalive interval; the registration-window
    /// probe waits out two of these before asking whether the cluster
    /// lives elsewhere.
    pub max_keepalive: Duration,
    /// Join attempts before giving up on a primary candidate.
    pub join_retries: u32,
    /// Initial join retry backoff; doubles per attempt.
    pub join_backoff: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(60),
            cplane_operation: Duration::from_secs(2),
            max_keepalive: Duration::from_secs(4),
            join_retries: 4,
            join_backoff: Duration::from_secs(1),
        }
    }
}
