use std::fmt;

use serde::Serialize;

/// Lifecycle of the one logical session a manager owns.
///
/// ```text
/// Disconnected --connect--> Connecting --success--> Connected
///                           Connecting --failure--> Disconnected
/// Connected --invalidate--> Reconnecting --success--> Connected
///                           Reconnecting --exhausted--> Disconnected
/// (any) --close--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session and no attempt in flight.
    Disconnected,
    /// First handshake in flight.
    Connecting,
    /// Session is live.
    Connected,
    /// Session was lost; reconnect in flight.
    Reconnecting,
    /// Terminal state. Every later request fails immediately.
    Closed,
}

impl ConnectionState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Numeric value for the state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Closed => 4,
        }
    }

    /// A handshake is in flight.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live session plus the generation it belongs to.
///
/// The generation increments on every successful handshake. Passing it back
/// to [`ConnectionManager::invalidate`](super::ConnectionManager::invalidate)
/// ensures a stale failure never tears down a newer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLease<S> {
    session: S,
    generation: u64,
}

impl<S> SessionLease<S> {
    pub(crate) const fn new(session: S, generation: u64) -> Self {
        Self {
            session,
            generation,
        }
    }

    /// The session handle.
    #[must_use]
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Generation this session was established in.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Take the session handle.
    #[must_use]
    pub fn into_session(self) -> S {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
    }

    #[test]
    fn only_handshake_states_are_in_flight() {
        assert!(ConnectionState::Connecting.is_in_flight());
        assert!(ConnectionState::Reconnecting.is_in_flight());
        assert!(!ConnectionState::Connected.is_in_flight());
        assert!(!ConnectionState::Closed.is_in_flight());
    }
}
