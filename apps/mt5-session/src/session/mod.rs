//! Terminal session ownership.
//!
//! [`ConnectionManager`] owns the one logical session and is the only code
//! that mutates [`ConnectionState`]. The transport behind the session is the
//! [`TerminalConnector`] port; [`GrpcConnector`] is the production adapter.

mod connector;
mod grpc;
mod manager;
mod state;

pub use connector::TerminalConnector;
pub use grpc::{GrpcConnector, GrpcConnectorConfig, SESSION_ID_METADATA_KEY, TerminalSession};
pub use manager::ConnectionManager;
pub use state::{ConnectionState, SessionLease};
