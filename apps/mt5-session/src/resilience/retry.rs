//! Retry policy with exponential backoff.
//!
//! | Retried | Surfaced |
//! |---------|----------|
//! | `Retryable` within the attempt budget | `Success` |
//! | | `Requote` (needs a fresh price) |
//! | | `Fatal`, `PermissionDenied`, `ResourceExhausted` |
//! | | anything whose delay would overrun the deadline |
//!
//! Delays grow as `seed * multiplier^(attempt - 1)`, capped at
//! `max_backoff`, with symmetric jitter. The seed is the classification's
//! wait hint when present, otherwise `initial_backoff`. A wait hint is also
//! a floor on the jittered delay.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::classification::{Classification, ClassificationKind};

/// Retry configuration for one class of calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum invocations per logical call, first attempt included (default: 5).
    pub max_attempts: u32,
    /// Initial backoff (default: 100ms).
    pub initial_backoff: Duration,
    /// Backoff ceiling (default: 5s).
    pub max_backoff: Duration,
    /// Exponential growth factor (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// State of one logical call's retry sequence.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Invocations made so far.
    pub attempt: u32,
    /// Caller deadline.
    pub deadline: Option<Instant>,
    /// Classification of the latest invocation.
    pub last_classification: Classification,
}

impl RetryContext {
    /// Context before the first invocation.
    #[must_use]
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            attempt: 0,
            deadline,
            last_classification: Classification::success(),
        }
    }

    /// Record the outcome of one more invocation.
    pub fn record(&mut self, classification: Classification) {
        self.attempt += 1;
        self.last_classification = classification;
    }
}

/// Result of [`RetryPolicy::next_delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Wait before the next attempt.
    pub delay: Duration,
    /// Whether to attempt again.
    pub should_retry: bool,
}

impl RetryDecision {
    const fn stop(delay: Duration) -> Self {
        Self {
            delay,
            should_retry: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom settings.
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter_factor,
        }
    }

    /// Decide whether and when to attempt again.
    #[must_use]
    pub fn next_delay(&self, ctx: &RetryContext) -> RetryDecision {
        let classification = &ctx.last_classification;
        if classification.kind != ClassificationKind::Retryable {
            return RetryDecision::stop(Duration::ZERO);
        }
        if ctx.attempt >= self.max_attempts {
            return RetryDecision::stop(Duration::ZERO);
        }

        let delay = self.backoff(ctx.attempt, classification.wait_hint);
        if let Some(deadline) = ctx.deadline
            && Instant::now() + delay > deadline
        {
            return RetryDecision::stop(delay);
        }

        RetryDecision {
            delay,
            should_retry: true,
        }
    }

    /// Delay after the `attempt`-th failed attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.backoff(attempt, None))
    }

    /// Jittered backoff after the `attempt`-th attempt (1-based).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn backoff(&self, attempt: u32, wait_hint: Option<Duration>) -> Duration {
        let seed_ms = wait_hint.unwrap_or(self.initial_backoff).as_millis() as f64;
        let max_ms = self.max_backoff.as_millis() as f64;
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = (seed_ms * self.backoff_multiplier.powi(exponent)).min(max_ms);

        let floor_ms = wait_hint.map_or(0.0, |hint| hint.as_millis() as f64);
        let delay_ms = self.apply_jitter(base_ms).max(floor_ms).min(max_ms);

        Duration::from_millis(delay_ms as u64)
    }

    fn apply_jitter(&self, base_ms: f64) -> f64 {
        let jitter_range = base_ms * self.jitter_factor;
        if jitter_range <= 0.0 {
            return base_ms;
        }
        let min = (base_ms - jitter_range).max(0.0);
        let max = base_ms + jitter_range;
        rand::rng().random_range(min..=max)
    }
}
