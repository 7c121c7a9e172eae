//! MT5 Session Binary
//!
//! Connects to the terminal gateway, keeps the session healthy, and serves
//! health and metrics over HTTP until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin mt5-session -- config.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `MT5_SESSION_CONFIG`: config file path, used when no argument is given
//! - `RUST_LOG`: log filter (overrides `observability.logging.level`)
//!
//! Any `${VAR}` referenced from the config file is resolved from the
//! environment, including variables loaded from `.env`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mt5_session::config::{Config, load_config_from_string};
use mt5_session::observability::telemetry;
use mt5_session::{
    CallContext, ConnectionManager, GrpcConnector, HealthServer, HealthServerState, init_metrics,
    load_config,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Default config file, loaded when present.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let config = load(config_path().as_deref())?;
    let _telemetry_guard = telemetry::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting MT5 session");
    log_config(&config);

    let _metrics_handle = init_metrics()?;

    let shutdown_token = CancellationToken::new();

    let connector = GrpcConnector::new(config.terminal.connector_config())?;
    let manager = ConnectionManager::new(connector, config.reconnect.to_policy());

    let initial = CallContext::with_timeout(config.terminal.connector_config().connect_timeout)
        .with_cancellation(shutdown_token.child_token());
    match manager.ensure_connected(&initial).await {
        Ok(lease) => tracing::info!(generation = lease.generation(), "Initial session established"),
        Err(e) => tracing::warn!(
            error = %e,
            "Initial connect failed, the health monitor will keep trying"
        ),
    }

    let monitor = manager.spawn_health_monitor(
        config.terminal.health_interval(),
        config.terminal.health_timeout(),
        shutdown_token.clone(),
    );

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        manager.subscribe(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    await_shutdown(shutdown_token).await;

    manager.close().await;

    let drain = async {
        let _ = monitor.await;
        let _ = health_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Background tasks did not stop in time"
        );
    }

    tracing::info!("MT5 session stopped");
    Ok(())
}

/// Config path from the first argument, then `MT5_SESSION_CONFIG`.
fn config_path() -> Option<String> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MT5_SESSION_CONFIG").ok())
}

/// Load an explicit config file, or `config.yaml` when present, or the defaults.
fn load(path: Option<&str>) -> Result<Config, mt5_session::ConfigError> {
    match path {
        Some(path) => load_config(Some(path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(Some(DEFAULT_CONFIG_PATH)),
        None => load_config_from_string(""),
    }
}

/// Load .env file, if any.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        endpoint = %config.terminal.endpoint,
        health_port = config.server.health_port,
        health_interval_secs = config.terminal.health_interval_secs,
        "Configuration loaded"
    );
    tracing::debug!(
        retry_max_attempts = config.retry.max_attempts,
        reconnect_max_attempts = config.reconnect.max_attempts,
        read_timeout_ms = config.timeouts.read_ms,
        trade_timeout_ms = config.timeouts.trade_ms,
        history_timeout_ms = config.timeouts.history_ms,
        "Resilience settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
