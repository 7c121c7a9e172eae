//! Session recovery integration tests.
//!
//! Exercises the connection manager's background health monitor together
//! with the health endpoint that reports its state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use mt5_session::health::router;
use mt5_session::{
    CallContext, ConnectError, ConnectionManager, ConnectionState, HealthServerState,
};

use common::{FakeConnector, fast_reconnect};

const INTERVAL: Duration = Duration::from_secs(1);
const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

async fn health_status(state: &Arc<HealthServerState>) -> StatusCode {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    router(Arc::clone(state)).oneshot(request).await.unwrap().status()
}

async fn wait_for_generation(manager: &ConnectionManager<FakeConnector>, generation: u64) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while manager.generation() < generation {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("generation never reached");
}

#[tokio::test(start_paused = true)]
async fn monitor_replaces_an_unhealthy_session() {
    let connector = FakeConnector::online();
    let manager = ConnectionManager::new(connector.clone(), fast_reconnect());
    manager
        .ensure_connected(&CallContext::background())
        .await
        .unwrap();

    connector.set_unhealthy(true);
    let shutdown = CancellationToken::new();
    let monitor = manager.spawn_health_monitor(INTERVAL, PROBE_TIMEOUT, shutdown.clone());

    wait_for_generation(&manager, 2).await;
    connector.set_unhealthy(false);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.generation(), 2);
    assert_eq!(connector.disconnects(), 1);

    shutdown.cancel();
    monitor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn monitor_recovers_from_failed_startup() {
    let connector = FakeConnector::online();
    connector.fail_next_handshakes(1);
    let manager = ConnectionManager::new(connector.clone(), fast_reconnect());
    let health = Arc::new(HealthServerState::new(
        "test".to_string(),
        manager.subscribe(),
    ));

    let err = manager
        .ensure_connected(&CallContext::background())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::Handshake(_)));
    assert_eq!(health_status(&health).await, StatusCode::SERVICE_UNAVAILABLE);

    let shutdown = CancellationToken::new();
    let monitor = manager.spawn_health_monitor(INTERVAL, PROBE_TIMEOUT, shutdown.clone());

    wait_for_generation(&manager, 1).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(health_status(&health).await, StatusCode::OK);
    assert_eq!(connector.handshakes(), 2);

    shutdown.cancel();
    monitor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_stops_monitor_and_reports_unhealthy() {
    let connector = FakeConnector::online();
    let manager = ConnectionManager::new(connector.clone(), fast_reconnect());
    let health = Arc::new(HealthServerState::new(
        "test".to_string(),
        manager.subscribe(),
    ));
    manager
        .ensure_connected(&CallContext::background())
        .await
        .unwrap();
    assert_eq!(health_status(&health).await, StatusCode::OK);

    let monitor =
        manager.spawn_health_monitor(INTERVAL, PROBE_TIMEOUT, CancellationToken::new());
    manager.close().await;

    tokio::time::timeout(Duration::from_secs(5), monitor)
        .await
        .expect("monitor stops once the manager is closed")
        .unwrap();

    assert_eq!(connector.disconnects(), 1);
    assert_eq!(health_status(&health).await, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        manager
            .ensure_connected(&CallContext::background())
            .await
            .unwrap_err(),
        ConnectError::Closed
    );
}
