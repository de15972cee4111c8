//! Network configuration for the control-plane listener.

use std::time::Duration;

use crate::config::GatewayConfig;

/// Listener-level settings, derived from the gateway configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the listener.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&GatewayConfig> for NetworkConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            request_timeout: config.timeouts.cplane_operation * 4,
        }
    }
}
