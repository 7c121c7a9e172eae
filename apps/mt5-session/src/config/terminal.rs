//! Terminal gateway connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::GrpcConnectorConfig;

/// Terminal gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Gateway URL. `https` enables TLS.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Seconds between background health checks.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    /// Upper bound for one health check in milliseconds.
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    /// TCP keepalive in seconds.
    #[serde(default = "default_tcp_keepalive_secs")]
    pub tcp_keepalive_secs: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            health_interval_secs: default_health_interval_secs(),
            health_timeout_ms: default_health_timeout_ms(),
            tcp_keepalive_secs: default_tcp_keepalive_secs(),
        }
    }
}

impl TerminalConfig {
    /// Interval between background health checks.
    #[must_use]
    pub const fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Upper bound for one health check.
    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Connector settings derived from this section.
    #[must_use]
    pub fn connector_config(&self) -> GrpcConnectorConfig {
        let mut config = GrpcConnectorConfig::new(self.endpoint.clone());
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config.tcp_keepalive = Duration::from_secs(self.tcp_keepalive_secs);
        config.probe_timeout = self.health_timeout();
        config
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:50051".to_string()
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

const fn default_health_interval_secs() -> u64 {
    15
}

const fn default_health_timeout_ms() -> u64 {
    3000
}

const fn default_tcp_keepalive_secs() -> u64 {
    30
}
