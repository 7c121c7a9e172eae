//! Request envelopes: one shape for every RPC wrapper.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::TimeoutSettings;
use crate::error::CallFailure;
use crate::resilience::CallContext;

/// Boxed request closure. Receives the live session and the call context,
/// and is invoked once per attempt.
pub type InvokeFn<S, T> =
    Box<dyn FnMut(S, CallContext) -> BoxFuture<'static, Result<T, CallFailure>> + Send>;

/// Extracts the trade return code from a successful response.
pub type RetcodeFn<T> = Box<dyn Fn(&T) -> Option<u32> + Send + Sync>;

/// Whether re-issuing a request can duplicate a side effect at the venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Idempotency {
    /// Reads and other side-effect free calls.
    #[default]
    Idempotent,
    /// Order submission and modification.
    NonIdempotent,
}

/// Default-timeout class of a request. The durations are configured in
/// [`TimeoutSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutClass {
    /// Simple reads. 3s unless configured.
    Read,
    /// Trading operations. 10s unless configured.
    Trade,
    /// History queries. 15s unless configured.
    History,
}

/// One logical RPC call handed to the executor.
pub struct RequestEnvelope<S, T> {
    pub(super) method: String,
    pub(super) invoke: InvokeFn<S, T>,
    pub(super) timeout_class: TimeoutClass,
    pub(super) timeout_override: Option<Duration>,
    pub(super) retcode: Option<RetcodeFn<T>>,
    pub(super) idempotency: Idempotency,
}

impl<S: 'static, T: 'static> RequestEnvelope<S, T> {
    /// Idempotent envelope whose default timeout comes from `class`.
    ///
    /// The executor resolves the class against its configured
    /// [`TimeoutSettings`](crate::config::TimeoutSettings).
    pub fn new<F, Fut>(method: impl Into<String>, class: TimeoutClass, mut invoke: F) -> Self
    where
        F: FnMut(S, CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CallFailure>> + Send + 'static,
    {
        Self {
            method: method.into(),
            invoke: Box::new(move |session, ctx| invoke(session, ctx).boxed()),
            timeout_class: class,
            timeout_override: None,
            retcode: None,
            idempotency: Idempotency::Idempotent,
        }
    }

    /// Idempotent read.
    pub fn read<F, Fut>(method: impl Into<String>, invoke: F) -> Self
    where
        F: FnMut(S, CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CallFailure>> + Send + 'static,
    {
        Self::new(method, TimeoutClass::Read, invoke)
    }

    /// Idempotent history query.
    pub fn history<F, Fut>(method: impl Into<String>, invoke: F) -> Self
    where
        F: FnMut(S, CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CallFailure>> + Send + 'static,
    {
        Self::new(method, TimeoutClass::History, invoke)
    }

    /// Non-idempotent trade operation.
    ///
    /// A transport failure is only retried when the closure reports
    /// [`Dispatch::NotSent`](crate::error::Dispatch::NotSent).
    pub fn trade<F, Fut>(method: impl Into<String>, invoke: F) -> Self
    where
        F: FnMut(S, CallContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CallFailure>> + Send + 'static,
    {
        Self::new(method, TimeoutClass::Trade, invoke).non_idempotent()
    }

    /// Read the trade return code out of each response and classify it.
    #[must_use]
    pub fn with_retcode<F>(mut self, extract: F) -> Self
    where
        F: Fn(&T) -> Option<u32> + Send + Sync + 'static,
    {
        self.retcode = Some(Box::new(extract));
        self
    }

    /// Use `timeout` instead of the configured default for the class.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Mark the call as having side effects at the venue.
    #[must_use]
    pub const fn non_idempotent(mut self) -> Self {
        self.idempotency = Idempotency::NonIdempotent;
        self
    }

    /// Method name used in logs, metrics, and errors.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Timeout class of the call.
    #[must_use]
    pub const fn timeout_class(&self) -> TimeoutClass {
        self.timeout_class
    }

    /// Timeout applied when the caller's context has no deadline, given the
    /// configured per-class defaults.
    #[must_use]
    pub const fn timeout_default(&self, timeouts: &TimeoutSettings) -> Duration {
        match self.timeout_override {
            Some(timeout) => timeout,
            None => timeouts.for_class(self.timeout_class),
        }
    }

    /// Idempotency of the call.
    #[must_use]
    pub const fn idempotency(&self) -> Idempotency {
        self.idempotency
    }
}

impl<S, T> fmt::Debug for RequestEnvelope<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("method", &self.method)
            .field("timeout_class", &self.timeout_class)
            .field("timeout_override", &self.timeout_override)
            .field("idempotency", &self.idempotency)
            .field("retcode", &self.retcode.is_some())
            .finish_non_exhaustive()
    }
}
