//! Retry and cancellation primitives shared by the executor and the
//! connection manager.

mod context;
mod retry;

pub use context::{CallContext, DoneReason};
pub use retry::{RetryContext, RetryDecision, RetryPolicy};
