//! Error types for the session core.
//!
//! - [`CallFailure`] is what a single RPC attempt reports back to the executor.
//! - [`ApiError`] is the caller-facing rendering of a surfaced failure.
//! - [`ConnectError`] covers session establishment and is shared between
//!   single-flight waiters, so it is `Clone`.
//! - [`ExecuteError`] is the only error a caller of
//!   [`RequestExecutor::execute`](crate::executor::RequestExecutor::execute) sees.

use std::fmt;

use thiserror::Error;
use tonic::{Code, Status};

use crate::classification::{Classification, ClassificationKind, TradeRetcode};
use crate::resilience::DoneReason;

/// API error code the gateway uses when the terminal instance behind a session is gone.
pub const TERMINAL_INSTANCE_NOT_FOUND: &str = "TERMINAL_INSTANCE_NOT_FOUND";

/// API error code the gateway uses when the terminal registry no longer knows the session.
pub const TERMINAL_REGISTRY_TERMINAL_NOT_FOUND: &str = "TERMINAL_REGISTRY_TERMINAL_NOT_FOUND";

// =============================================================================
// Dispatch
// =============================================================================

/// Whether a failed request may have reached the trading venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// The request provably never left the client.
    NotSent,
    /// The request may have been delivered; its outcome is unknown.
    #[default]
    Unknown,
}

// =============================================================================
// ApiError
// =============================================================================

/// Structured error surfaced to callers.
///
/// Renders the most specific code available: trade return code first,
/// then the MQL error code, then the bare API error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// API-level error code (e.g. `UNAVAILABLE`, `TERMINAL_INSTANCE_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// MQL runtime error code, when the terminal reported one.
    pub mql_code: Option<i32>,
    /// Trade return code, when the failure came from a trade operation.
    pub trade_code: Option<u32>,
}

impl ApiError {
    /// Create an API error with only the generic code.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            mql_code: None,
            trade_code: None,
        }
    }

    /// Attach an MQL runtime error code.
    #[must_use]
    pub const fn with_mql_code(mut self, mql_code: i32) -> Self {
        self.mql_code = Some(mql_code);
        self
    }

    /// Attach a trade return code.
    #[must_use]
    pub const fn with_trade_code(mut self, trade_code: u32) -> Self {
        self.trade_code = Some(trade_code);
        self
    }

    /// Build from a trade return code reported in a response payload.
    #[must_use]
    pub fn from_retcode(code: u32) -> Self {
        match TradeRetcode::from_code(code) {
            Some(retcode) => Self::new(retcode.name(), retcode.description()).with_trade_code(code),
            None => Self::new(
                "TRADE_RETCODE_UNKNOWN",
                format!("unrecognized trade return code {code}"),
            )
            .with_trade_code(code),
        }
    }

    /// Build from a gRPC transport status.
    #[must_use]
    pub fn from_status(status: &Status) -> Self {
        Self::new(status_code_name(status.code()), status.message())
    }

    /// True when the gateway reports that the terminal behind the session is gone.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        self.code == TERMINAL_INSTANCE_NOT_FOUND || self.code == TERMINAL_REGISTRY_TERMINAL_NOT_FOUND
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(trade_code) = self.trade_code {
            return match TradeRetcode::from_code(trade_code) {
                Some(retcode) => write!(f, "{retcode}: {}", self.message),
                None => write!(f, "trade retcode {trade_code}: {}", self.message),
            };
        }
        if let Some(mql_code) = self.mql_code {
            return write!(f, "MQL error {mql_code}: {}", self.message);
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Canonical upper-case name of a gRPC status code.
#[must_use]
pub const fn status_code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

// =============================================================================
// CallFailure
// =============================================================================

/// Failure reported by one invocation of a request closure.
#[derive(Debug, Clone, Error)]
pub enum CallFailure {
    /// The transport failed.
    #[error("transport error {}: {}", status_code_name(.status.code()), .status.message())]
    Transport {
        /// Status reported by the channel.
        status: Status,
        /// Whether the request may have reached the venue.
        dispatch: Dispatch,
    },

    /// The gateway answered with a structured API error.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CallFailure {
    /// Transport failure whose delivery is unknown.
    #[must_use]
    pub const fn transport(status: Status) -> Self {
        Self::Transport {
            status,
            dispatch: Dispatch::Unknown,
        }
    }

    /// Transport failure that provably happened before the request was sent.
    #[must_use]
    pub const fn not_sent(status: Status) -> Self {
        Self::Transport {
            status,
            dispatch: Dispatch::NotSent,
        }
    }

    /// True when re-issuing the request cannot duplicate a side effect at the venue.
    #[must_use]
    pub fn is_safe_to_reissue(&self) -> bool {
        match self {
            Self::Transport { dispatch, .. } => *dispatch == Dispatch::NotSent,
            Self::Api(err) => err.is_session_lost(),
        }
    }

    /// Caller-facing rendering of this failure.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        match self {
            Self::Transport { status, .. } => ApiError::from_status(status),
            Self::Api(err) => err.clone(),
        }
    }
}

impl From<Status> for CallFailure {
    fn from(status: Status) -> Self {
        Self::transport(status)
    }
}

// =============================================================================
// ConnectError
// =============================================================================

/// Errors establishing or keeping a terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Endpoint could not be parsed or configured.
    #[error("invalid terminal endpoint: {0}")]
    InvalidEndpoint(String),

    /// Handshake with the terminal failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Health probe of a live session failed.
    #[error("health check failed: {0}")]
    HealthCheck(String),

    /// Reconnect gave up.
    #[error("reconnect exhausted after {attempts} attempts: {last_error}")]
    ReconnectExhausted {
        /// Handshake attempts made.
        attempts: u32,
        /// Last handshake error.
        last_error: String,
    },

    /// The manager has been closed.
    #[error("connection manager is closed")]
    Closed,

    /// The caller cancelled while waiting for a session.
    #[error("cancelled while waiting for a session")]
    Cancelled,

    /// The caller's deadline expired while waiting for a session.
    #[error("deadline exceeded while waiting for a session")]
    DeadlineExceeded,
}

impl ConnectError {
    /// Waiting ended because of the caller's context, not the session.
    #[must_use]
    pub const fn done_reason(&self) -> Option<DoneReason> {
        match self {
            Self::Cancelled => Some(DoneReason::Cancelled),
            Self::DeadlineExceeded => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }
}

impl From<DoneReason> for ConnectError {
    fn from(reason: DoneReason) -> Self {
        match reason {
            DoneReason::Cancelled => Self::Cancelled,
            DoneReason::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

// =============================================================================
// ExecuteError
// =============================================================================

/// Error returned by [`RequestExecutor::execute`](crate::executor::RequestExecutor::execute).
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Surfaced without exhausting retries: fatal, requote, permission or resource failure.
    #[error("{method} failed after {attempts} attempt(s): {error}")]
    Rejected {
        /// Request method name.
        method: String,
        /// Invocations made.
        attempts: u32,
        /// Classification of the final attempt.
        classification: Classification,
        /// Most specific error rendering.
        error: ApiError,
    },

    /// A retryable failure persisted past the retry budget.
    #[error("{method} retries exhausted after {attempts} attempt(s): {error}")]
    RetriesExhausted {
        /// Request method name.
        method: String,
        /// Invocations made.
        attempts: u32,
        /// Classification of the final attempt.
        classification: Classification,
        /// Most specific error rendering.
        error: ApiError,
    },

    /// A non-idempotent request failed after it may have reached the venue.
    #[error("{method} outcome unknown after {attempts} attempt(s): {classification}")]
    OutcomeUnknown {
        /// Request method name.
        method: String,
        /// Invocations made.
        attempts: u32,
        /// Classification of the failure.
        classification: Classification,
    },

    /// The caller's context ended first.
    #[error("{method} {reason} after {attempts} attempt(s){}", response_suffix(.response_unknown))]
    Cancelled {
        /// Request method name.
        method: String,
        /// Invocations made.
        attempts: u32,
        /// Why the context ended.
        reason: DoneReason,
        /// An invocation was in flight when the context ended.
        response_unknown: bool,
    },

    /// No session could be obtained.
    #[error("{method}: {source}")]
    Connection {
        /// Request method name.
        method: String,
        /// Underlying session error.
        source: ConnectError,
    },
}

const fn response_suffix(response_unknown: &bool) -> &'static str {
    if *response_unknown {
        " with response unknown"
    } else {
        ""
    }
}

impl ExecuteError {
    /// Classification kind of the surfaced failure.
    ///
    /// Cancellation and session failures report `Fatal`: neither is retried
    /// by the executor.
    #[must_use]
    pub fn kind(&self) -> ClassificationKind {
        match self {
            Self::Rejected { classification, .. }
            | Self::RetriesExhausted { classification, .. }
            | Self::OutcomeUnknown { classification, .. } => classification.kind,
            Self::Cancelled { .. } | Self::Connection { .. } => ClassificationKind::Fatal,
        }
    }

    /// Classification of the final attempt, when one was classified.
    #[must_use]
    pub const fn classification(&self) -> Option<&Classification> {
        match self {
            Self::Rejected { classification, .. }
            | Self::RetriesExhausted { classification, .. }
            | Self::OutcomeUnknown { classification, .. } => Some(classification),
            Self::Cancelled { .. } | Self::Connection { .. } => None,
        }
    }

    /// Invocations made before the error was surfaced.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Rejected { attempts, .. }
            | Self::RetriesExhausted { attempts, .. }
            | Self::OutcomeUnknown { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
            Self::Connection { .. } => 0,
        }
    }

    /// Caller-facing API error, for rejected and exhausted calls.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Rejected { error, .. } | Self::RetriesExhausted { error, .. } => Some(error),
            _ => None,
        }
    }

    /// True when the venue asked for a fresh price.
    #[must_use]
    pub fn is_requote(&self) -> bool {
        self.kind() == ClassificationKind::Requote
    }

    /// True when the context ended.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn outcome_label(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::OutcomeUnknown { .. } => "outcome_unknown",
            Self::Cancelled { .. } => "cancelled",
            Self::Connection { .. } => "connection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_trade_code() {
        let err = ApiError::new("TRADE_FAILED", "order rejected")
            .with_mql_code(4756)
            .with_trade_code(10016);
        assert_eq!(
            err.to_string(),
            "TRADE_RETCODE_INVALID_STOPS (10016): order rejected"
        );
    }

    #[test]
    fn display_prefers_mql_code_over_api_code() {
        let err = ApiError::new("MQL_ERROR", "invalid symbol").with_mql_code(4301);
        assert_eq!(err.to_string(), "MQL error 4301: invalid symbol");
    }

    #[test]
    fn display_falls_back_to_api_code() {
        let err = ApiError::new("UNAVAILABLE", "gateway down");
        assert_eq!(err.to_string(), "UNAVAILABLE: gateway down");
    }

    #[test]
    fn unknown_retcode_keeps_raw_value() {
        let err = ApiError::from_retcode(10099);
        assert_eq!(err.trade_code, Some(10099));
        assert!(err.to_string().contains("10099"));
    }

    #[test]
    fn session_lost_codes_are_detected() {
        assert!(ApiError::new(TERMINAL_INSTANCE_NOT_FOUND, "gone").is_session_lost());
        assert!(ApiError::new(TERMINAL_REGISTRY_TERMINAL_NOT_FOUND, "gone").is_session_lost());
        assert!(!ApiError::new("INVALID_SYMBOL", "nope").is_session_lost());
    }

    #[test]
    fn only_not_sent_transport_failures_are_safe_to_reissue() {
        assert!(CallFailure::not_sent(Status::unavailable("down")).is_safe_to_reissue());
        assert!(!CallFailure::transport(Status::unavailable("down")).is_safe_to_reissue());
        assert!(!CallFailure::from(Status::unavailable("down")).is_safe_to_reissue());
    }

    #[test]
    fn transport_failure_display_names_status() {
        let failure = CallFailure::transport(Status::deadline_exceeded("slow"));
        assert_eq!(failure.to_string(), "transport error DEADLINE_EXCEEDED: slow");
    }

    #[test]
    fn connect_error_maps_done_reason() {
        assert_eq!(
            ConnectError::from(DoneReason::Cancelled).done_reason(),
            Some(DoneReason::Cancelled)
        );
        assert_eq!(ConnectError::Closed.done_reason(), None);
    }
}
