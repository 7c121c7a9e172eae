//! Port for establishing terminal sessions.

use async_trait::async_trait;

use crate::error::ConnectError;

/// Opens, probes, and releases sessions with a remote trading terminal.
///
/// [`ConnectionManager`](super::ConnectionManager) is the only caller. It
/// serializes handshakes, so implementations need no coordination of their own.
#[async_trait]
pub trait TerminalConnector: Send + Sync + 'static {
    /// Handle passed to request closures. Cloned once per call.
    type Session: Clone + Send + Sync + 'static;

    /// Perform the handshake and return a live session.
    async fn handshake(&self) -> Result<Self::Session, ConnectError>;

    /// Probe a session that is believed to be live.
    async fn health_check(&self, session: &Self::Session) -> Result<(), ConnectError>;

    /// Release a session. Best effort; errors are the implementation's to log.
    async fn disconnect(&self, session: Self::Session);
}
