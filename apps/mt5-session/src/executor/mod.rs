//! Request execution.
//!
//! Every RPC wrapper builds a [`RequestEnvelope`] and hands it to
//! [`RequestExecutor::execute`], so context normalization, classification,
//! retry, and reconnect live in exactly one place.

mod envelope;
mod execute;

pub use envelope::{Idempotency, InvokeFn, RequestEnvelope, RetcodeFn, TimeoutClass};
pub use execute::{ExecuteFailure, RequestExecutor};
