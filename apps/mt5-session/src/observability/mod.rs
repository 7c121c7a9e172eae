//! Logging, tracing, and metrics.

pub mod metrics;
pub mod telemetry;
