//! Connection manager: owns the one logical session to the terminal.
//!
//! All state lives behind a single mutex that is never held across an
//! `.await`. Handshakes run in a spawned task (a "flight"); callers that
//! need a session while a flight is running wait on the flight's `watch`
//! channel, so concurrent callers share one handshake and observe the same
//! outcome.
//!
//! # Flights
//!
//! - **Connect** (from `Disconnected`): one handshake. Failure returns to
//!   `Disconnected` and is reported to every waiter.
//! - **Reconnect** (from `Connected`, via [`ConnectionManager::invalidate`]):
//!   releases the stale session, then retries the handshake with the
//!   reconnect policy's backoff until it succeeds or the policy is exhausted.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connector::TerminalConnector;
use super::state::{ConnectionState, SessionLease};
use crate::error::ConnectError;
use crate::observability::metrics;
use crate::resilience::{CallContext, RetryPolicy};

type FlightOutcome<S> = Option<Result<SessionLease<S>, ConnectError>>;

enum Flight<S> {
    Connect,
    Reconnect { stale: Option<S> },
}

impl<S> Flight<S> {
    const fn state(&self) -> ConnectionState {
        match self {
            Self::Connect => ConnectionState::Connecting,
            Self::Reconnect { .. } => ConnectionState::Reconnecting,
        }
    }
}

struct SessionSlot<S> {
    state: ConnectionState,
    session: Option<SessionLease<S>>,
    generation: u64,
    flight: Option<watch::Receiver<FlightOutcome<S>>>,
}

struct Shared<C: TerminalConnector> {
    connector: C,
    reconnect_policy: RetryPolicy,
    slot: Mutex<SessionSlot<C::Session>>,
    state_tx: watch::Sender<ConnectionState>,
    closed: CancellationToken,
}

/// Owns one logical session and coordinates connect, reconnect, and close.
///
/// Cheap to clone; clones share the same session.
pub struct ConnectionManager<C: TerminalConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: TerminalConnector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: TerminalConnector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.shared.slot.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &slot.state)
            .field("generation", &slot.generation)
            .finish_non_exhaustive()
    }
}

impl<C: TerminalConnector> ConnectionManager<C> {
    /// Create a manager in `Disconnected`. No handshake happens until the
    /// first [`ensure_connected`](Self::ensure_connected).
    #[must_use]
    pub fn new(connector: C, reconnect_policy: RetryPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                reconnect_policy,
                slot: Mutex::new(SessionSlot {
                    state: ConnectionState::Disconnected,
                    session: None,
                    generation: 0,
                    flight: None,
                }),
                state_tx,
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.slot.lock().state
    }

    /// Generation of the current (or most recent) session. Zero before the first handshake.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.slot.lock().generation
    }

    /// Receiver of state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Return a live session, connecting or joining an in-flight handshake as needed.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Closed`] after [`close`](Self::close)
    /// - [`ConnectError::Cancelled`] / [`ConnectError::DeadlineExceeded`] when
    ///   `ctx` ends first (the handshake keeps running for other callers)
    /// - the handshake or reconnect error otherwise
    pub async fn ensure_connected(
        &self,
        ctx: &CallContext,
    ) -> Result<SessionLease<C::Session>, ConnectError> {
        if let Some(reason) = ctx.done_reason() {
            return Err(reason.into());
        }

        let flight = {
            let mut slot = self.shared.slot.lock();
            let state = slot.state;
            match state {
                ConnectionState::Closed => return Err(ConnectError::Closed),
                ConnectionState::Connected => match slot.session.clone() {
                    Some(lease) => return Ok(lease),
                    None => self.start_flight(&mut slot, Flight::Connect),
                },
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    match slot.flight.clone() {
                        Some(flight) => flight,
                        None => self.start_flight(&mut slot, Flight::Connect),
                    }
                }
                ConnectionState::Disconnected => self.start_flight(&mut slot, Flight::Connect),
            }
        };

        self.await_flight(flight, ctx).await
    }

    /// Report that the session of `generation` is broken and start a reconnect.
    ///
    /// Only the first report for the live generation starts a reconnect;
    /// reports for older generations, or while a handshake is already in
    /// flight, are ignored. Returns whether a reconnect was started.
    pub fn invalidate(&self, generation: u64, reason: &str) -> bool {
        let mut slot = self.shared.slot.lock();
        if slot.state != ConnectionState::Connected || slot.generation != generation {
            tracing::debug!(
                generation,
                current_generation = slot.generation,
                state = %slot.state,
                reason,
                "Ignoring stale session invalidation"
            );
            return false;
        }

        tracing::warn!(generation, reason, "Session invalidated, reconnecting");
        let stale = slot.session.take().map(SessionLease::into_session);
        self.start_flight(&mut slot, Flight::Reconnect { stale });
        true
    }

    /// Probe the live session; invalidate it when the probe fails.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Closed`] after close
    /// - [`ConnectError::HealthCheck`] when not connected or the probe fails
    /// - [`ConnectError::Cancelled`] / [`ConnectError::DeadlineExceeded`] when
    ///   `ctx` ends first; the session is left alone
    pub async fn health_check(&self, ctx: &CallContext) -> Result<(), ConnectError> {
        let lease = {
            let slot = self.shared.slot.lock();
            match (&slot.state, &slot.session) {
                (ConnectionState::Closed, _) => return Err(ConnectError::Closed),
                (ConnectionState::Connected, Some(lease)) => lease.clone(),
                (state, _) => {
                    return Err(ConnectError::HealthCheck(format!("session is {state}")));
                }
            }
        };

        let probe = tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason.into()),
            result = self.shared.connector.health_check(lease.session()) => result,
        };

        metrics::record_health_check(probe.is_ok());
        if let Err(e) = &probe {
            self.invalidate(lease.generation(), &e.to_string());
        }
        probe
    }

    /// Run health checks every `interval` until `shutdown` fires or the manager closes.
    ///
    /// A live session is probed; a `Disconnected` manager is reconnected.
    /// Each round is bounded by `probe_timeout`.
    pub fn spawn_health_monitor(
        &self,
        interval: Duration,
        probe_timeout: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = manager.shared.closed.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let ctx = CallContext::with_timeout(probe_timeout)
                    .with_cancellation(shutdown.child_token());
                match manager.state() {
                    ConnectionState::Connected => {
                        if let Err(e) = manager.health_check(&ctx).await {
                            tracing::warn!(error = %e, "Health check failed");
                        }
                    }
                    ConnectionState::Disconnected => {
                        if let Err(e) = manager.ensure_connected(&ctx).await {
                            tracing::warn!(error = %e, "Background connect failed");
                        }
                    }
                    state if state.is_in_flight() => {
                        tracing::debug!(%state, "Handshake in flight, skipping health round");
                    }
                    // Closed
                    _ => break,
                }
            }
            tracing::debug!("Health monitor stopped");
        })
    }

    /// Close the manager and release the session. Idempotent.
    ///
    /// Waiters on an in-flight handshake fail with [`ConnectError::Closed`];
    /// a session produced by that handshake is released.
    pub async fn close(&self) {
        let session = {
            let mut slot = self.shared.slot.lock();
            if slot.state == ConnectionState::Closed {
                return;
            }
            self.shared.transition(&mut slot, ConnectionState::Closed);
            slot.flight = None;
            slot.session.take()
        };
        self.shared.closed.cancel();

        if let Some(lease) = session {
            self.shared.connector.disconnect(lease.into_session()).await;
        }
        tracing::info!("Connection manager closed");
    }

    fn start_flight(
        &self,
        slot: &mut SessionSlot<C::Session>,
        flight: Flight<C::Session>,
    ) -> watch::Receiver<FlightOutcome<C::Session>> {
        let (tx, rx) = watch::channel(None);
        slot.flight = Some(rx.clone());
        self.shared.transition(slot, flight.state());

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let attempt = async {
                match flight {
                    Flight::Connect => shared.connect_once().await,
                    Flight::Reconnect { stale } => {
                        if let Some(stale) = stale {
                            shared.connector.disconnect(stale).await;
                        }
                        shared.reconnect().await
                    }
                }
            };
            // A panicking connector must still settle the flight.
            let result = AssertUnwindSafe(attempt).catch_unwind().await.unwrap_or_else(|_| {
                tracing::error!("Connector panicked during handshake");
                Err(ConnectError::Handshake("connector panicked".to_string()))
            });
            let outcome = shared.finish_flight(result).await;
            tx.send_replace(Some(outcome));
        });

        rx
    }

    async fn await_flight(
        &self,
        mut flight: watch::Receiver<FlightOutcome<C::Session>>,
        ctx: &CallContext,
    ) -> Result<SessionLease<C::Session>, ConnectError> {
        tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason.into()),
            () = self.shared.closed.cancelled() => return Err(ConnectError::Closed),
            outcome = flight.wait_for(Option::is_some) => {
                if let Ok(outcome) = outcome {
                    return Option::clone(&outcome).unwrap_or(Err(ConnectError::Closed));
                }
            }
        }

        // The flight task died without publishing; free the slot for the next caller.
        let mut slot = self.shared.slot.lock();
        if slot
            .flight
            .as_ref()
            .is_some_and(|current| current.same_channel(&flight))
        {
            slot.flight = None;
            slot.session = None;
            self.shared.transition(&mut slot, ConnectionState::Disconnected);
        }
        Err(ConnectError::Handshake("connection attempt aborted".to_string()))
    }
}

impl<C: TerminalConnector> Shared<C> {
    fn transition(&self, slot: &mut SessionSlot<C::Session>, next: ConnectionState) {
        let previous = slot.state;
        if previous == next {
            return;
        }
        slot.state = next;
        self.state_tx.send_replace(next);
        metrics::set_connection_state(next);
        tracing::info!(
            from = %previous,
            to = %next,
            generation = slot.generation,
            "Connection state changed"
        );
    }

    async fn connect_once(&self) -> Result<C::Session, ConnectError> {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(ConnectError::Closed),
            result = self.connector.handshake() => result,
        };
        metrics::record_handshake(result.is_ok(), started.elapsed());
        result
    }

    async fn reconnect(&self) -> Result<C::Session, ConnectError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::record_reconnect_attempt();

            let err = match self.connect_once().await {
                Ok(session) => return Ok(session),
                Err(ConnectError::Closed) => return Err(ConnectError::Closed),
                Err(e) => e,
            };

            let Some(delay) = self.reconnect_policy.delay_for_attempt(attempt) else {
                tracing::error!(attempts = attempt, error = %err, "Reconnect exhausted");
                return Err(ConnectError::ReconnectExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            };

            tracing::warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Reconnect attempt failed, backing off"
            );
            tokio::select! {
                () = self.closed.cancelled() => return Err(ConnectError::Closed),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Publish a flight's result into the slot. A session that arrives after
    /// close is released instead of published.
    async fn finish_flight(
        &self,
        result: Result<C::Session, ConnectError>,
    ) -> Result<SessionLease<C::Session>, ConnectError> {
        let orphan = {
            let mut slot = self.slot.lock();
            if slot.state == ConnectionState::Closed {
                result.ok()
            } else {
                slot.flight = None;
                return match result {
                    Ok(session) => {
                        slot.generation += 1;
                        let lease = SessionLease::new(session, slot.generation);
                        slot.session = Some(lease.clone());
                        self.transition(&mut slot, ConnectionState::Connected);
                        Ok(lease)
                    }
                    Err(e) => {
                        slot.session = None;
                        self.transition(&mut slot, ConnectionState::Disconnected);
                        tracing::warn!(error = %e, "Connection attempt failed");
                        Err(e)
                    }
                };
            }
        };

        if let Some(session) = orphan {
            self.connector.disconnect(session).await;
        }
        Err(ConnectError::Closed)
    }
}
