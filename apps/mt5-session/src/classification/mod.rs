//! Result classification.
//!
//! Maps the raw outcome of one RPC attempt (a transport failure, an API
//! error, or a trade return code) to a [`Classification`]. Classification
//! is pure: no I/O, no state, no blocking.
//!
//! Unknown return codes and unmapped status codes classify as `Fatal`.
//! Nothing is retried unless it is known to be safe.

mod retcode;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tonic::{Code, Status};

pub use retcode::{RetcodeGroup, TradeRetcode};

use crate::error::{ApiError, CallFailure};

/// Status messages that indicate the connection dropped under an `Unknown` status.
const CONNECTION_DROP_MARKERS: &[&str] = &["connection reset", "broken pipe", "connection refused"];

// =============================================================================
// Types
// =============================================================================

/// Outcome category of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKind {
    /// The call succeeded.
    Success,
    /// Transient failure; safe to re-attempt before the venue accepted the request.
    Retryable,
    /// The venue wants a fresh price. Never retried automatically.
    Requote,
    /// Permanent rejection.
    Fatal,
    /// Fatal: trading is not permitted.
    PermissionDenied,
    /// Fatal: an account or server limit was reached.
    ResourceExhausted,
}

impl ClassificationKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retryable => "retryable",
            Self::Requote => "requote",
            Self::Fatal => "fatal",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceExhausted => "resource_exhausted",
        }
    }

    /// `Fatal` or one of its sub-kinds.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::Fatal | Self::PermissionDenied | Self::ResourceExhausted
        )
    }
}

impl fmt::Display for ClassificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of one call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Outcome category.
    pub kind: ClassificationKind,
    /// Numeric code: the trade return code, MQL code, or gRPC status code.
    pub code: i64,
    /// Human-readable reason.
    pub message: String,
    /// Minimum wait before the next attempt, when the venue implies one.
    pub wait_hint: Option<Duration>,
    /// The session should be re-established before the next attempt.
    pub reconnect: bool,
    /// Success with partial execution (`10010`). The caller inspects the filled volume.
    pub partial: bool,
}

impl Classification {
    /// Plain success.
    #[must_use]
    pub fn success() -> Self {
        Self::new(ClassificationKind::Success, 0, "ok")
    }

    /// Classification with no hints.
    #[must_use]
    pub fn new(kind: ClassificationKind, code: i64, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            wait_hint: None,
            reconnect: false,
            partial: false,
        }
    }

    #[must_use]
    const fn with_reconnect(mut self) -> Self {
        self.reconnect = true;
        self
    }

    /// Whether this outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind == ClassificationKind::Success
    }

    /// Whether this outcome may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == ClassificationKind::Retryable
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.code, self.message)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classify the outcome of one call attempt.
///
/// A failure takes precedence over a return code. No failure and no return
/// code is a success.
#[must_use]
pub fn classify(failure: Option<&CallFailure>, retcode: Option<u32>) -> Classification {
    match (failure, retcode) {
        (Some(failure), _) => classify_failure(failure),
        (None, Some(code)) => classify_retcode(code),
        (None, None) => Classification::success(),
    }
}

/// Classify a failed call.
#[must_use]
pub fn classify_failure(failure: &CallFailure) -> Classification {
    match failure {
        CallFailure::Transport { status, .. } => classify_status(status),
        CallFailure::Api(err) => classify_api_error(err),
    }
}

/// Classify a trade return code using the fixed return-code table.
#[must_use]
pub fn classify_retcode(code: u32) -> Classification {
    let Some(retcode) = TradeRetcode::from_code(code) else {
        return Classification::new(
            ClassificationKind::Fatal,
            i64::from(code),
            format!("unrecognized trade return code {code}"),
        );
    };

    Classification {
        kind: retcode.kind(),
        code: i64::from(code),
        message: format!("{}: {}", retcode.name(), retcode.description()),
        wait_hint: retcode.wait_hint(),
        reconnect: false,
        partial: retcode == TradeRetcode::DonePartial,
    }
}

/// Classify a gRPC transport status.
#[must_use]
pub fn classify_status(status: &Status) -> Classification {
    let code = i64::from(status.code() as i32);
    let message = format!(
        "{}: {}",
        crate::error::status_code_name(status.code()),
        status.message()
    );

    match status.code() {
        Code::Unavailable => {
            Classification::new(ClassificationKind::Retryable, code, message).with_reconnect()
        }
        Code::DeadlineExceeded | Code::Aborted => {
            Classification::new(ClassificationKind::Retryable, code, message)
        }
        Code::Unknown if is_connection_drop(status.message()) => {
            Classification::new(ClassificationKind::Retryable, code, message).with_reconnect()
        }
        Code::ResourceExhausted => {
            Classification::new(ClassificationKind::ResourceExhausted, code, message)
        }
        Code::PermissionDenied | Code::Unauthenticated => {
            Classification::new(ClassificationKind::PermissionDenied, code, message)
        }
        _ => Classification::new(ClassificationKind::Fatal, code, message),
    }
}

/// Classify a structured API error from the gateway.
#[must_use]
pub fn classify_api_error(err: &ApiError) -> Classification {
    if let Some(trade_code) = err.trade_code {
        return classify_retcode(trade_code);
    }
    let code = err.mql_code.map_or(0, i64::from);
    if err.is_session_lost() {
        return Classification::new(ClassificationKind::Retryable, code, err.to_string())
            .with_reconnect();
    }
    Classification::new(ClassificationKind::Fatal, code, err.to_string())
}

fn is_connection_drop(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    CONNECTION_DROP_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

// =============================================================================
// Return-code predicates
// =============================================================================

/// True only for `TRADE_RETCODE_DONE` (10009).
#[must_use]
pub const fn is_retcode_success(code: u32) -> bool {
    code == TradeRetcode::Done.code()
}

/// True for the two requote codes (10004, 10020).
#[must_use]
pub fn is_retcode_requote(code: u32) -> bool {
    TradeRetcode::from_code(code).is_some_and(|r| r.group() == RetcodeGroup::Requote)
}

/// True for return codes the venue documents as transient.
#[must_use]
pub fn is_retcode_retryable(code: u32) -> bool {
    TradeRetcode::from_code(code).is_some_and(|r| r.kind() == ClassificationKind::Retryable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(10012 ; "timeout")]
    #[test_case(10031 ; "no connection")]
    #[test_case(10029 ; "frozen")]
    #[test_case(10028 ; "locked")]
    #[test_case(10024 ; "too many requests")]
    #[test_case(10021 ; "no quotes")]
    fn retryable_retcodes(code: u32) {
        let c = classify(None, Some(code));
        assert_eq!(c.kind, ClassificationKind::Retryable);
        assert!(is_retcode_retryable(code));
        assert!(!c.reconnect);
    }

    #[test_case(10004 ; "requote")]
    #[test_case(10020 ; "price changed")]
    fn requote_retcodes(code: u32) {
        assert_eq!(classify(None, Some(code)).kind, ClassificationKind::Requote);
        assert!(is_retcode_requote(code));
    }

    #[test_case(10006 ; "reject")]
    #[test_case(10013 ; "invalid request")]
    #[test_case(10014 ; "invalid volume")]
    #[test_case(10015 ; "invalid price")]
    #[test_case(10016 ; "invalid stops")]
    #[test_case(10018 ; "market closed")]
    #[test_case(10022 ; "invalid expiration")]
    #[test_case(10030 ; "invalid fill")]
    #[test_case(10035 ; "invalid order")]
    #[test_case(10038 ; "invalid close volume")]
    #[test_case(10011 ; "processing error")]
    fn fatal_retcodes(code: u32) {
        assert_eq!(classify(None, Some(code)).kind, ClassificationKind::Fatal);
    }

    #[test_case(10017 ; "trade disabled")]
    #[test_case(10026 ; "server disables autotrading")]
    #[test_case(10027 ; "client disables autotrading")]
    #[test_case(10032 ; "only real")]
    #[test_case(10042 ; "long only")]
    #[test_case(10043 ; "short only")]
    #[test_case(10044 ; "close only")]
    #[test_case(10045 ; "fifo close")]
    #[test_case(10046 ; "hedge prohibited")]
    fn restriction_retcodes_are_permission_denied(code: u32) {
        let kind = classify(None, Some(code)).kind;
        assert_eq!(kind, ClassificationKind::PermissionDenied);
        assert!(kind.is_fatal());
    }

    #[test_case(10019 ; "no money")]
    #[test_case(10033 ; "limit orders")]
    #[test_case(10034 ; "limit volume")]
    #[test_case(10040 ; "limit positions")]
    fn limit_retcodes_are_resource_exhausted(code: u32) {
        let kind = classify(None, Some(code)).kind;
        assert_eq!(kind, ClassificationKind::ResourceExhausted);
        assert!(kind.is_fatal());
    }

    #[test]
    fn done_is_success() {
        let c = classify(None, Some(10009));
        assert!(c.is_success());
        assert!(!c.partial);
    }

    #[test]
    fn done_partial_is_partial_success() {
        let c = classify(None, Some(10010));
        assert!(c.is_success());
        assert!(c.partial);
        assert!(!is_retcode_success(10010));
    }

    #[test]
    fn no_failure_and_no_retcode_is_success() {
        assert!(classify(None, None).is_success());
    }

    #[test]
    fn unknown_retcode_is_fatal_with_raw_code() {
        let c = classify(None, Some(12345));
        assert_eq!(c.kind, ClassificationKind::Fatal);
        assert_eq!(c.code, 12345);
        assert!(c.message.contains("12345"));
    }

    #[test]
    fn wait_hints_follow_retcode() {
        assert_eq!(
            classify_retcode(10024).wait_hint,
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            classify_retcode(10028).wait_hint,
            Some(Duration::from_millis(500))
        );
        assert_eq!(classify_retcode(10012).wait_hint, None);
    }

    #[test_case(Status::unavailable("down"), ClassificationKind::Retryable, true ; "unavailable")]
    #[test_case(Status::deadline_exceeded("slow"), ClassificationKind::Retryable, false ; "deadline")]
    #[test_case(Status::aborted("conflict"), ClassificationKind::Retryable, false ; "aborted")]
    #[test_case(Status::unknown("Connection reset by peer"), ClassificationKind::Retryable, true ; "connection reset")]
    #[test_case(Status::unknown("something odd"), ClassificationKind::Fatal, false ; "plain unknown")]
    #[test_case(Status::resource_exhausted("quota"), ClassificationKind::ResourceExhausted, false ; "resource exhausted")]
    #[test_case(Status::permission_denied("no"), ClassificationKind::PermissionDenied, false ; "permission denied")]
    #[test_case(Status::unauthenticated("who"), ClassificationKind::PermissionDenied, false ; "unauthenticated")]
    #[test_case(Status::invalid_argument("bad"), ClassificationKind::Fatal, false ; "invalid argument")]
    #[test_case(Status::internal("boom"), ClassificationKind::Fatal, false ; "internal")]
    fn transport_statuses(status: Status, kind: ClassificationKind, reconnect: bool) {
        let c = classify(Some(&CallFailure::transport(status)), None);
        assert_eq!(c.kind, kind);
        assert_eq!(c.reconnect, reconnect);
    }

    #[test]
    fn failure_takes_precedence_over_retcode() {
        let failure = CallFailure::transport(Status::unavailable("down"));
        let c = classify(Some(&failure), Some(10009));
        assert_eq!(c.kind, ClassificationKind::Retryable);
    }

    #[test]
    fn session_lost_api_error_requests_reconnect() {
        let failure = CallFailure::Api(ApiError::new(
            crate::error::TERMINAL_INSTANCE_NOT_FOUND,
            "terminal gone",
        ));
        let c = classify(Some(&failure), None);
        assert_eq!(c.kind, ClassificationKind::Retryable);
        assert!(c.reconnect);
    }

    #[test]
    fn api_error_with_trade_code_uses_retcode_table() {
        let failure = CallFailure::Api(ApiError::new("TRADE", "rejected").with_trade_code(10016));
        assert_eq!(classify(Some(&failure), None).kind, ClassificationKind::Fatal);
    }

    #[test]
    fn other_api_errors_are_fatal() {
        let failure = CallFailure::Api(ApiError::new("INVALID_SYMBOL", "XYZ").with_mql_code(4301));
        let c = classify(Some(&failure), None);
        assert_eq!(c.kind, ClassificationKind::Fatal);
        assert_eq!(c.code, 4301);
    }

    proptest! {
        #[test]
        fn retcode_success_iff_done(code in any::<u32>()) {
            prop_assert_eq!(is_retcode_success(code), code == 10009);
        }

        #[test]
        fn undocumented_retcodes_fail_closed(code in any::<u32>()) {
            prop_assume!(TradeRetcode::from_code(code).is_none());
            let c = classify(None, Some(code));
            prop_assert_eq!(c.kind, ClassificationKind::Fatal);
            prop_assert!(c.message.contains(&code.to_string()));
        }

        #[test]
        fn success_kind_only_for_success_group(code in 10000u32..10100) {
            let c = classify(None, Some(code));
            if c.is_success() {
                prop_assert!(code == 10009 || code == 10010);
            }
        }
    }
}
