//! Configuration loading, validation, and environment variable interpolation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mt5_session::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! let policy = config.retry.to_policy();
//! ```
//!
//! Every section is optional; an empty document yields the defaults.

mod observability;
mod resilience;
mod server;
mod terminal;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::RequestExecutor;
use crate::session::{ConnectionManager, TerminalConnector};

pub use observability::{LoggingConfig, ObservabilityConfig, OtelConfig};
pub use resilience::{ReconnectSettings, RetrySettings, TimeoutSettings};
pub use server::ServerConfig;
pub use terminal::TerminalConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Terminal gateway connection.
    #[serde(default)]
    pub terminal: TerminalConfig,
    /// Per-call retry policy.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Default timeouts per request class.
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    /// Health and metrics HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging and tracing.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Request executor over `connection` with the configured retry policy
    /// and per-class timeouts.
    #[must_use]
    pub fn executor<C: TerminalConnector>(&self, connection: ConnectionManager<C>) -> RequestExecutor<C> {
        RequestExecutor::new(connection, self.retry.to_policy()).with_timeouts(self.timeouts.clone())
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. A variable that is
/// unset or empty takes the default, or the empty string without one.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let endpoint = &config.terminal.endpoint;
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "terminal.endpoint must be an http(s) URL, got '{endpoint}'"
        )));
    }
    if config.terminal.connect_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "terminal.connect_timeout_ms must be positive".to_string(),
        ));
    }
    if config.terminal.health_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "terminal.health_interval_secs must be positive".to_string(),
        ));
    }

    let retry = &config.retry;
    validate_backoff(
        "retry",
        retry.max_attempts,
        retry.initial_backoff_ms,
        retry.max_backoff_ms,
        retry.backoff_multiplier,
        retry.jitter_factor,
    )?;
    let reconnect = &config.reconnect;
    validate_backoff(
        "reconnect",
        reconnect.max_attempts,
        reconnect.initial_backoff_ms,
        reconnect.max_backoff_ms,
        reconnect.backoff_multiplier,
        reconnect.jitter_factor,
    )?;

    let timeouts = &config.timeouts;
    if timeouts.read_ms == 0 || timeouts.trade_ms == 0 || timeouts.history_ms == 0 {
        return Err(ConfigError::ValidationError(
            "timeouts must be positive".to_string(),
        ));
    }

    let format = config.observability.logging.format.as_str();
    if !matches!(format, "json" | "pretty") {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be 'json' or 'pretty', got '{format}'"
        )));
    }

    Ok(())
}

fn validate_backoff(
    section: &str,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    multiplier: f64,
    jitter: f64,
) -> Result<(), ConfigError> {
    if max_attempts == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{section}.max_attempts must be at least 1"
        )));
    }
    if initial_backoff_ms > max_backoff_ms {
        return Err(ConfigError::ValidationError(format!(
            "{section}.initial_backoff_ms must not exceed {section}.max_backoff_ms"
        )));
    }
    if multiplier < 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "{section}.backoff_multiplier must be at least 1.0"
        )));
    }
    if !(0.0..=1.0).contains(&jitter) {
        return Err(ConfigError::ValidationError(format!(
            "{section}.jitter_factor must be between 0.0 and 1.0"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::executor::TimeoutClass;

    #[test]
    fn empty_document_yields_defaults() {
        let config = load_config_from_string("").unwrap();
        assert_eq!(config.terminal.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.server.health_port, 8086);
        assert_eq!(config.observability.logging.format, "json");
        assert!(!config.observability.otel.enabled);
    }

    #[test]
    fn timeout_classes_default_to_three_ten_fifteen() {
        let timeouts = TimeoutSettings::default();
        assert_eq!(timeouts.for_class(TimeoutClass::Read), Duration::from_secs(3));
        assert_eq!(timeouts.for_class(TimeoutClass::Trade), Duration::from_secs(10));
        assert_eq!(timeouts.for_class(TimeoutClass::History), Duration::from_secs(15));
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let yaml = r"
retry:
  max_attempts: 3
reconnect:
  initial_backoff_ms: 250
";
        let config = load_config_from_string(yaml).unwrap();
        let retry = config.retry.to_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff, Duration::from_millis(100));
        let reconnect = config.reconnect.to_policy();
        assert_eq!(reconnect.initial_backoff, Duration::from_millis(250));
        assert_eq!(reconnect.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "endpoint: ${MT5_SESSION_TEST_NONEXISTENT_VAR:-http://gateway:50051}";
        assert_eq!(interpolate_env_vars(input), "endpoint: http://gateway:50051");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax
    fn env_var_with_default_uses_existing() {
        let result = interpolate_env_vars("path: ${PATH:-default}");
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "token: ${MT5_SESSION_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "token: ");
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let yaml = r#"
terminal:
  endpoint: "tcp://127.0.0.1:50051"
"#;
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for tcp endpoint");
        };
        assert!(err.to_string().contains("terminal.endpoint"));
    }

    #[test]
    fn rejects_zero_attempts() {
        let yaml = r"
retry:
  max_attempts: 0
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for zero attempts");
        };
        assert!(err.to_string().contains("retry.max_attempts"));
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let yaml = r"
reconnect:
  initial_backoff_ms: 60000
  max_backoff_ms: 1000
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for inverted bounds");
        };
        assert!(err.to_string().contains("reconnect.initial_backoff_ms"));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let yaml = r"
observability:
  logging:
    format: xml
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for log format");
        };
        assert!(err.to_string().contains("format"));
    }

    #[test]
    fn example_config_matches_defaults() {
        let config = load_config_from_string(include_str!("../../config.example.yaml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.retry.to_policy(), defaults.retry.to_policy());
        assert_eq!(config.reconnect.to_policy(), defaults.reconnect.to_policy());
        assert_eq!(config.timeouts.trade_ms, defaults.timeouts.trade_ms);
        assert_eq!(config.terminal.health_timeout_ms, defaults.terminal.health_timeout_ms);
    }

    #[test]
    fn full_config_parse() {
        let yaml = r#"
terminal:
  endpoint: "https://mt5.example.com:443"
  connect_timeout_ms: 2000
  health_interval_secs: 5
  health_timeout_ms: 1000

retry:
  max_attempts: 4
  initial_backoff_ms: 50
  max_backoff_ms: 2000
  backoff_multiplier: 1.5
  jitter_factor: 0.1

timeouts:
  read_ms: 1500
  trade_ms: 8000
  history_ms: 20000

server:
  health_port: 9090

observability:
  logging:
    level: debug
    format: pretty
  otel:
    enabled: true
    endpoint: "http://collector:4317"
"#;
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.terminal.health_interval(), Duration::from_secs(5));
        let connector = config.terminal.connector_config();
        assert_eq!(connector.connect_timeout, Duration::from_secs(2));
        assert_eq!(connector.probe_timeout, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.timeouts.for_class(TimeoutClass::Trade), Duration::from_secs(8));
        assert_eq!(config.server.health_port, 9090);
        assert_eq!(config.observability.logging.level, "debug");
        assert!(config.observability.otel.enabled);
        assert_eq!(config.observability.otel.service_name, "mt5-session");
    }
}
