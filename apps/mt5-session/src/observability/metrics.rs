//! Prometheus metrics.
//!
//! # Metrics Categories
//!
//! - **Requests**: invocations, retries by classification, surfaced outcomes
//! - **Session**: connection state, handshakes, reconnect attempts, health probes
//!
//! Without an installed recorder every call here is a no-op, so library
//! users that do not export metrics pay nothing.
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::classification::ClassificationKind;
use crate::session::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, once per process.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Handle for rendering metrics. `None` before [`init_metrics`].
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "mt5_session_attempts_total",
        "RPC invocations issued by the executor"
    );
    describe_counter!(
        "mt5_session_retries_total",
        "Retries scheduled by the executor, by classification"
    );
    describe_counter!(
        "mt5_session_outcomes_total",
        "Logical call outcomes returned to callers"
    );
    describe_histogram!(
        "mt5_session_call_duration_seconds",
        "Wall time of a logical call including retries"
    );

    describe_gauge!(
        "mt5_session_connection_state",
        "Current connection state (0=disconnected 1=connecting 2=connected 3=reconnecting 4=closed)"
    );
    describe_counter!(
        "mt5_session_handshakes_total",
        "Terminal handshakes by result"
    );
    describe_histogram!(
        "mt5_session_handshake_duration_seconds",
        "Terminal handshake latency"
    );
    describe_counter!(
        "mt5_session_reconnect_attempts_total",
        "Reconnect handshake attempts"
    );
    describe_counter!(
        "mt5_session_health_checks_total",
        "Session health probes by result"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one invocation of a request closure.
pub fn record_attempt(method: &str) {
    counter!("mt5_session_attempts_total", "method" => method.to_string()).increment(1);
}

/// Record a scheduled retry.
pub fn record_retry(method: &str, kind: ClassificationKind) {
    counter!(
        "mt5_session_retries_total",
        "method" => method.to_string(),
        "classification" => kind.as_str()
    )
    .increment(1);
}

/// Record the outcome of a logical call and its duration.
pub fn record_outcome(method: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "mt5_session_outcomes_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "mt5_session_call_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Publish the current connection state.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("mt5_session_connection_state").set(f64::from(state.as_gauge()));
}

/// Record a handshake result and its latency.
pub fn record_handshake(success: bool, duration: Duration) {
    counter!(
        "mt5_session_handshakes_total",
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    histogram!("mt5_session_handshake_duration_seconds").record(duration.as_secs_f64());
}

/// Record a reconnect handshake attempt.
pub fn record_reconnect_attempt() {
    counter!("mt5_session_reconnect_attempts_total").increment(1);
}

/// Record a health probe result.
pub fn record_health_check(healthy: bool) {
    counter!(
        "mt5_session_health_checks_total",
        "result" => if healthy { "healthy" } else { "unhealthy" }
    )
    .increment(1);
}
