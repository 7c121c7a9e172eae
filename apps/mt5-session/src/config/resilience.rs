//! Retry, reconnect, and timeout configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::executor::TimeoutClass;
use crate::resilience::RetryPolicy;

/// Per-call retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum invocations per call, first attempt included.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds.
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_retry_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter factor in `[0, 1]`.
    #[serde(default = "default_retry_jitter")]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            initial_backoff_ms: default_retry_initial_backoff_ms(),
            max_backoff_ms: default_retry_max_backoff_ms(),
            backoff_multiplier: default_multiplier(),
            jitter_factor: default_retry_jitter(),
        }
    }
}

impl RetrySettings {
    /// Policy for [`RequestExecutor`](crate::executor::RequestExecutor).
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.backoff_multiplier,
            self.jitter_factor,
        )
    }
}

/// Reconnect settings for the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// Handshake attempts per reconnect.
    #[serde(default = "default_reconnect_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds.
    #[serde(default = "default_reconnect_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_reconnect_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter factor in `[0, 1]`.
    #[serde(default = "default_reconnect_jitter")]
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_reconnect_max_attempts(),
            initial_backoff_ms: default_reconnect_initial_backoff_ms(),
            max_backoff_ms: default_reconnect_max_backoff_ms(),
            backoff_multiplier: default_multiplier(),
            jitter_factor: default_reconnect_jitter(),
        }
    }
}

impl ReconnectSettings {
    /// Policy for [`ConnectionManager`](crate::session::ConnectionManager).
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.backoff_multiplier,
            self.jitter_factor,
        )
    }
}

/// Default timeouts per request class, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Simple reads.
    #[serde(default = "default_read_ms")]
    pub read_ms: u64,
    /// Trading operations.
    #[serde(default = "default_trade_ms")]
    pub trade_ms: u64,
    /// History queries.
    #[serde(default = "default_history_ms")]
    pub history_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            read_ms: default_read_ms(),
            trade_ms: default_trade_ms(),
            history_ms: default_history_ms(),
        }
    }
}

impl TimeoutSettings {
    /// Configured default timeout for `class`.
    #[must_use]
    pub const fn for_class(&self, class: TimeoutClass) -> Duration {
        Duration::from_millis(match class {
            TimeoutClass::Read => self.read_ms,
            TimeoutClass::Trade => self.trade_ms,
            TimeoutClass::History => self.history_ms,
        })
    }
}

const fn default_retry_max_attempts() -> u32 {
    5
}

const fn default_retry_initial_backoff_ms() -> u64 {
    100
}

const fn default_retry_max_backoff_ms() -> u64 {
    5000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_retry_jitter() -> f64 {
    0.2
}

const fn default_reconnect_max_attempts() -> u32 {
    10
}

const fn default_reconnect_initial_backoff_ms() -> u64 {
    500
}

const fn default_reconnect_max_backoff_ms() -> u64 {
    30_000
}

const fn default_reconnect_jitter() -> f64 {
    0.1
}

const fn default_read_ms() -> u64 {
    3000
}

const fn default_trade_ms() -> u64 {
    10_000
}

const fn default_history_ms() -> u64 {
    15_000
}
