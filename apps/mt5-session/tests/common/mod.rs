//! Shared fixtures: an in-memory terminal connector and call helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tonic::Status;

use mt5_session::{
    CallFailure, ConnectError, ConnectionManager, RequestExecutor, RetryPolicy, TerminalConnector,
};

/// Connector whose session is the handshake number (1, 2, ...).
#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    handshakes: AtomicU64,
    failing_handshakes: AtomicU32,
    offline: AtomicBool,
    unhealthy: AtomicBool,
    disconnects: AtomicU32,
}

impl FakeConnector {
    /// Every handshake succeeds.
    pub fn online() -> Self {
        Self::default()
    }

    /// Every handshake fails.
    pub fn offline() -> Self {
        let connector = Self::default();
        connector.inner.offline.store(true, Ordering::SeqCst);
        connector
    }

    /// The next `count` handshakes fail.
    pub fn fail_next_handshakes(&self, count: u32) {
        self.inner.failing_handshakes.store(count, Ordering::SeqCst);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.inner.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Handshakes attempted, successful or not.
    pub fn handshakes(&self) -> u64 {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.inner.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalConnector for FakeConnector {
    type Session = u64;

    async fn handshake(&self) -> Result<u64, ConnectError> {
        let n = self.inner.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(ConnectError::Handshake("terminal offline".to_string()));
        }
        let failing = self.inner.failing_handshakes.load(Ordering::SeqCst);
        if failing > 0 {
            self.inner
                .failing_handshakes
                .store(failing - 1, Ordering::SeqCst);
            return Err(ConnectError::Handshake("terminal busy".to_string()));
        }
        Ok(n)
    }

    async fn health_check(&self, _session: &u64) -> Result<(), ConnectError> {
        if self.inner.unhealthy.load(Ordering::SeqCst) {
            return Err(ConnectError::HealthCheck("gateway unreachable".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self, _session: u64) {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reconnect policy fast enough to keep tests short.
pub fn fast_reconnect() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50), 2.0, 0.0)
}

pub fn executor(connector: FakeConnector, retry: RetryPolicy) -> RequestExecutor<FakeConnector> {
    RequestExecutor::new(ConnectionManager::new(connector, fast_reconnect()), retry)
}

/// Counts invocations of a request closure.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    /// Record one call and return its 1-based number.
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn unavailable() -> CallFailure {
    CallFailure::transport(Status::unavailable("terminal connection lost"))
}

pub fn deadline_exceeded() -> CallFailure {
    CallFailure::transport(Status::deadline_exceeded("gateway timed out"))
}

/// Trade response carrying an MT5 return code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResult {
    pub retcode: u32,
    pub order: u64,
}

impl OrderResult {
    pub const fn new(retcode: u32) -> Self {
        Self { retcode, order: 0 }
    }
}
