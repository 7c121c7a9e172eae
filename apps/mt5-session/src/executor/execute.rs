//! The retry loop every RPC wrapper runs through.

use tokio::time::Instant;
use tracing::Instrument;

use super::envelope::{Idempotency, RequestEnvelope};
use crate::classification::{Classification, classify};
use crate::config::TimeoutSettings;
use crate::error::{ApiError, CallFailure, ExecuteError};
use crate::observability::metrics;
use crate::resilience::{CallContext, DoneReason, RetryContext, RetryPolicy};
use crate::session::{ConnectionManager, TerminalConnector};

/// What one failed attempt produced.
enum AttemptFailure<T> {
    Call(CallFailure),
    Retcode { code: u32, response: T },
}

impl<T> AttemptFailure<T> {
    /// A retryable return code is the venue saying the request did not execute.
    fn is_safe_to_reissue(&self) -> bool {
        match self {
            Self::Call(failure) => failure.is_safe_to_reissue(),
            Self::Retcode { .. } => true,
        }
    }

    fn to_api_error(&self) -> ApiError {
        match self {
            Self::Call(failure) => failure.to_api_error(),
            Self::Retcode { code, .. } => ApiError::from_retcode(*code),
        }
    }

    fn into_response(self) -> Option<T> {
        match self {
            Self::Call(_) => None,
            Self::Retcode { response, .. } => Some(response),
        }
    }
}

/// A surfaced failure plus the response that carried the failing return code.
///
/// A requote response holds the venue's new prices, so callers deciding
/// whether to resubmit use [`RequestExecutor::execute_with_response`].
#[derive(Debug)]
pub struct ExecuteFailure<T> {
    /// The classified failure.
    pub error: ExecuteError,
    /// Last response, when the failure came from its return code.
    pub response: Option<T>,
}

impl<T> From<ExecuteError> for ExecuteFailure<T> {
    fn from(error: ExecuteError) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

/// Runs requests against a shared [`ConnectionManager`] with classification,
/// retry, and reconnect.
pub struct RequestExecutor<C: TerminalConnector> {
    connection: ConnectionManager<C>,
    retry_policy: RetryPolicy,
    timeouts: TimeoutSettings,
}

impl<C: TerminalConnector> Clone for RequestExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            retry_policy: self.retry_policy.clone(),
            timeouts: self.timeouts.clone(),
        }
    }
}

impl<C: TerminalConnector> std::fmt::Debug for RequestExecutor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("connection", &self.connection)
            .field("retry_policy", &self.retry_policy)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl<C: TerminalConnector> RequestExecutor<C> {
    /// Create an executor over `connection` with the default per-class timeouts.
    #[must_use]
    pub fn new(connection: ConnectionManager<C>, retry_policy: RetryPolicy) -> Self {
        Self {
            connection,
            retry_policy,
            timeouts: TimeoutSettings::default(),
        }
    }

    /// Replace the per-class default timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutSettings) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The shared connection manager.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// The per-call retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Default timeouts applied per [`TimeoutClass`](super::TimeoutClass).
    #[must_use]
    pub const fn timeouts(&self) -> &TimeoutSettings {
        &self.timeouts
    }

    /// Run one logical call.
    ///
    /// `None` behaves as a background context. A context without a deadline
    /// gets the configured timeout of the envelope's class, or the envelope's
    /// own override; this happens once, before the
    /// first attempt, so retries share one deadline.
    ///
    /// Each attempt obtains a session, invokes the closure, and classifies the
    /// result. Retryable failures are retried per the retry policy; a reconnect
    /// hint invalidates the session first. Everything else is surfaced.
    ///
    /// # Errors
    ///
    /// See [`ExecuteError`]. A caller never receives an unclassified transport error.
    pub async fn execute<T: Send + 'static>(
        &self,
        ctx: Option<CallContext>,
        envelope: RequestEnvelope<C::Session, T>,
    ) -> Result<T, ExecuteError> {
        self.execute_with_response(ctx, envelope)
            .await
            .map_err(|failure| failure.error)
    }

    /// Like [`execute`](Self::execute), but a failure surfaced from a return
    /// code keeps the response it arrived in.
    ///
    /// # Errors
    ///
    /// See [`ExecuteError`].
    pub async fn execute_with_response<T: Send + 'static>(
        &self,
        ctx: Option<CallContext>,
        envelope: RequestEnvelope<C::Session, T>,
    ) -> Result<T, ExecuteFailure<T>> {
        let ctx = CallContext::normalize(ctx, envelope.timeout_default(&self.timeouts));
        let span = tracing::info_span!(
            "execute",
            method = %envelope.method,
            idempotency = ?envelope.idempotency,
        );
        let method = envelope.method.clone();
        let started = Instant::now();

        let result = self.run(&ctx, envelope).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(failure) => failure.error.outcome_label(),
        };
        metrics::record_outcome(&method, outcome, started.elapsed());
        result
    }

    async fn run<T: Send + 'static>(
        &self,
        ctx: &CallContext,
        envelope: RequestEnvelope<C::Session, T>,
    ) -> Result<T, ExecuteFailure<T>> {
        let RequestEnvelope {
            method,
            mut invoke,
            retcode,
            idempotency,
            ..
        } = envelope;
        let mut retry = RetryContext::new(ctx.deadline());

        loop {
            if let Some(reason) = ctx.done_reason() {
                return Err(cancelled(method, retry.attempt, reason, false).into());
            }

            let lease = match self.connection.ensure_connected(ctx).await {
                Ok(lease) => lease,
                Err(e) => {
                    return Err(ExecuteFailure::from(match e.done_reason() {
                        Some(reason) => cancelled(method, retry.attempt, reason, false),
                        None => {
                            tracing::warn!(error = %e, "No session available");
                            ExecuteError::Connection { method, source: e }
                        }
                    }));
                }
            };

            metrics::record_attempt(&method);
            let call = invoke(lease.session().clone(), ctx.clone());
            let result = tokio::select! {
                biased;
                result = call => result,
                reason = ctx.done() => {
                    tracing::warn!(%reason, "Context ended with a request in flight");
                    return Err(cancelled(method, retry.attempt + 1, reason, true).into());
                }
            };

            let (classification, failure) = match result {
                Ok(value) => {
                    let code = retcode.as_ref().and_then(|extract| extract(&value));
                    let classification = classify(None, code);
                    if classification.is_success() {
                        if classification.partial {
                            tracing::info!(attempt = retry.attempt + 1, "Request partially executed");
                        }
                        return Ok(value);
                    }
                    // A non-success classification of a response always comes from a return code.
                    let Some(code) = code else {
                        return Ok(value);
                    };
                    (classification, AttemptFailure::Retcode { code, response: value })
                }
                Err(failure) => (classify(Some(&failure), None), AttemptFailure::Call(failure)),
            };
            retry.record(classification.clone());

            if classification.reconnect {
                self.connection
                    .invalidate(lease.generation(), &classification.message);
            }

            if classification.is_retryable()
                && idempotency == Idempotency::NonIdempotent
                && !failure.is_safe_to_reissue()
            {
                tracing::error!(
                    attempts = retry.attempt,
                    classification = %classification,
                    "Non-idempotent request may have reached the venue, not retrying"
                );
                return Err(ExecuteError::OutcomeUnknown {
                    method,
                    attempts: retry.attempt,
                    classification,
                }
                .into());
            }

            let decision = self.retry_policy.next_delay(&retry);
            if !decision.should_retry {
                return Err(surface(method, retry.attempt, classification, failure));
            }

            metrics::record_retry(&method, classification.kind);
            tracing::debug!(
                attempt = retry.attempt,
                delay_ms = u64::try_from(decision.delay.as_millis()).unwrap_or(u64::MAX),
                classification = %classification,
                "Retrying request"
            );

            tokio::select! {
                biased;
                reason = ctx.done() => {
                    return Err(cancelled(method, retry.attempt, reason, false).into());
                }
                () = tokio::time::sleep(decision.delay) => {}
            }
        }
    }
}

fn cancelled(method: String, attempts: u32, reason: DoneReason, response_unknown: bool) -> ExecuteError {
    ExecuteError::Cancelled {
        method,
        attempts,
        reason,
        response_unknown,
    }
}

fn surface<T>(
    method: String,
    attempts: u32,
    classification: Classification,
    failure: AttemptFailure<T>,
) -> ExecuteFailure<T> {
    let error = failure.to_api_error();
    let response = failure.into_response();
    let error = if classification.is_retryable() {
        tracing::warn!(attempts, error = %error, "Retries exhausted");
        ExecuteError::RetriesExhausted {
            method,
            attempts,
            classification,
            error,
        }
    } else {
        tracing::info!(
            attempts,
            classification = %classification.kind,
            error = %error,
            "Request rejected"
        );
        ExecuteError::Rejected {
            method,
            attempts,
            classification,
            error,
        }
    };
    ExecuteFailure { error, response }
}
