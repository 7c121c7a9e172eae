#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! MT5 Session - Resilient Execution Core
//!
//! Owns the session to a remote MetaTrader 5 terminal gateway and routes
//! every RPC through a single execution path that classifies results,
//! retries transient failures, and coordinates reconnects.
//!
//! # Modules
//!
//! - `classification`: maps transport status and trade return codes to a
//!   [`ClassificationKind`]
//! - `resilience`: call contexts, deadlines, and the backoff policy
//! - `session`: the [`TerminalConnector`] port, its gRPC adapter, and the
//!   single-flight [`ConnectionManager`]
//! - `executor`: [`RequestEnvelope`] and the [`RequestExecutor`] retry loop
//! - `config`, `observability`, `health`: YAML configuration, tracing and
//!   Prometheus metrics, and the HTTP health endpoint
//!
//! # Request Flow
//!
//! ```text
//! caller ──► RequestExecutor::execute
//!              │
//!              ├─► ConnectionManager::ensure_connected ──► (shared handshake)
//!              ├─► invoke closure ──► terminal gateway
//!              └─► classify ──► Success ──► caller
//!                        │
//!                        ├─ Retryable ──► backoff ──► (invalidate) ──► retry
//!                        └─ otherwise ──► ExecuteError
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classification;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod observability;
pub mod resilience;
pub mod session;

// =============================================================================
// Re-exports
// =============================================================================

// Classification
pub use classification::{
    Classification, ClassificationKind, RetcodeGroup, TradeRetcode, classify, is_retcode_requote,
    is_retcode_retryable, is_retcode_success,
};

// Errors
pub use error::{ApiError, CallFailure, ConnectError, Dispatch, ExecuteError};

// Resilience
pub use resilience::{CallContext, DoneReason, RetryContext, RetryDecision, RetryPolicy};

// Session
pub use session::{
    ConnectionManager, ConnectionState, GrpcConnector, GrpcConnectorConfig, SessionLease,
    TerminalConnector, TerminalSession,
};

// Executor
pub use executor::{ExecuteFailure, Idempotency, RequestEnvelope, RequestExecutor, TimeoutClass};

// Config
pub use config::{Config, ConfigError, load_config};

// Health server
pub use health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use observability::metrics::init_metrics;
