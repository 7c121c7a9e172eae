//! gRPC connector for the terminal gateway.
//!
//! A session is a `tonic` channel plus a client-generated session id. The
//! gateway routes every request to the right terminal instance by the `id`
//! metadata entry, so request closures build their requests through
//! [`TerminalSession::request`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tonic::metadata::{AsciiMetadataValue, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use uuid::Uuid;

use super::connector::TerminalConnector;
use crate::error::ConnectError;
use crate::resilience::CallContext;

/// Metadata key carrying the session id.
pub const SESSION_ID_METADATA_KEY: &str = "id";

/// Connection settings for [`GrpcConnector`].
#[derive(Debug, Clone)]
pub struct GrpcConnectorConfig {
    /// Gateway URL, e.g. `http://127.0.0.1:50051`. `https` enables TLS with native roots.
    pub endpoint: String,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// TCP keepalive interval.
    pub tcp_keepalive: Duration,
    /// HTTP/2 keepalive ping interval.
    pub http2_keepalive_interval: Duration,
    /// HTTP/2 keepalive ping timeout.
    pub keepalive_timeout: Duration,
    /// Upper bound for one health probe.
    pub probe_timeout: Duration,
}

impl GrpcConnectorConfig {
    /// Settings for `endpoint` with default timeouts.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Duration::from_secs(30),
            http2_keepalive_interval: Duration::from_secs(20),
            keepalive_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Live session with the terminal gateway.
#[derive(Debug, Clone)]
pub struct TerminalSession {
    channel: Channel,
    session_id: Uuid,
    id_header: AsciiMetadataValue,
}

impl TerminalSession {
    /// Channel for generated clients.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Session id attached to every request.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Wrap `message` in a request tagged with this session's id.
    #[must_use]
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert(SESSION_ID_METADATA_KEY, self.id_header.clone());
        request
    }

    /// Like [`request`](Self::request), with the gRPC timeout set to what is
    /// left of `ctx`'s deadline.
    #[must_use]
    pub fn request_with_context<T>(&self, message: T, ctx: &CallContext) -> tonic::Request<T> {
        let mut request = self.request(message);
        if let Some(remaining) = ctx.remaining() {
            request.set_timeout(remaining);
        }
        request
    }
}

/// Production [`TerminalConnector`] over a `tonic` channel.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    config: GrpcConnectorConfig,
    endpoint: Endpoint,
}

impl GrpcConnector {
    /// Validate the endpoint and build the connector. No I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::InvalidEndpoint`] if the URL does not parse or
    /// TLS cannot be configured.
    pub fn new(config: GrpcConnectorConfig) -> Result<Self, ConnectError> {
        let endpoint = Self::create_endpoint(&config)?;
        Ok(Self { config, endpoint })
    }

    fn create_endpoint(config: &GrpcConnectorConfig) -> Result<Endpoint, ConnectError> {
        let endpoint = Channel::from_shared(config.endpoint.clone())
            .map_err(|e| ConnectError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Some(config.tcp_keepalive))
            .http2_keep_alive_interval(config.http2_keepalive_interval)
            .keep_alive_timeout(config.keepalive_timeout)
            .keep_alive_while_idle(true)
            .tcp_nodelay(true);

        if endpoint.uri().scheme_str() == Some("https") {
            return endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| ConnectError::InvalidEndpoint(format!("TLS configuration: {e}")));
        }
        Ok(endpoint)
    }

    fn probe_address(&self) -> Result<(String, u16), ConnectError> {
        let uri = self.endpoint.uri();
        let host = uri
            .host()
            .ok_or_else(|| ConnectError::InvalidEndpoint(format!("{uri} has no host")))?;
        let default_port = if uri.scheme_str() == Some("https") { 443 } else { 80 };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok((host.to_string(), uri.port_u16().unwrap_or(default_port)))
    }
}

#[async_trait]
impl TerminalConnector for GrpcConnector {
    type Session = TerminalSession;

    async fn handshake(&self) -> Result<TerminalSession, ConnectError> {
        tracing::info!(endpoint = %self.config.endpoint, "Connecting to terminal gateway");

        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| ConnectError::Handshake(format!("{}: {e}", self.config.endpoint)))?;

        let session_id = Uuid::new_v4();
        let id_header = MetadataValue::try_from(session_id.to_string())
            .map_err(|e| ConnectError::Handshake(format!("session id header: {e}")))?;

        tracing::info!(
            endpoint = %self.config.endpoint,
            session_id = %session_id,
            "Terminal session established"
        );
        Ok(TerminalSession {
            channel,
            session_id,
            id_header,
        })
    }

    /// TCP reachability of the gateway. A `tonic` channel reports ready
    /// without touching the network, so it cannot be probed directly.
    async fn health_check(&self, session: &TerminalSession) -> Result<(), ConnectError> {
        let (host, port) = self.probe_address()?;
        match tokio::time::timeout(
            self.config.probe_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        {
            Ok(Ok(_)) => {
                tracing::trace!(session_id = %session.session_id, "Gateway reachable");
                Ok(())
            }
            Ok(Err(e)) => Err(ConnectError::HealthCheck(format!("{host}:{port}: {e}"))),
            Err(_) => Err(ConnectError::HealthCheck(format!(
                "{host}:{port}: no answer within {}ms",
                self.config.probe_timeout.as_millis()
            ))),
        }
    }

    async fn disconnect(&self, session: TerminalSession) {
        tracing::info!(session_id = %session.session_id, "Releasing terminal session");
        drop(session);
    }
}
