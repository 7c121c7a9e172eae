//! HTTP server configuration for health and metrics.

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port serving `/health`, `/healthz`, and `/metrics`.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_port: default_health_port(),
        }
    }
}

const fn default_health_port() -> u16 {
    8086
}
