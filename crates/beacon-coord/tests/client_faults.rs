//! Coordination client behavior under ensemble faults
//!
//! TigerStyle: Every fault is injected explicitly through `MemoryEnsemble`.

use beacon_coord::{
    ClientOptions, CoordError, CoordinationClient, CreateMode, MemoryEnsemble, RetryPolicy,
};
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn bounded() -> RetryPolicy {
    RetryPolicy::exponential_backoff(1, 3)
}

async fn connected(ensemble: &MemoryEnsemble, policy: RetryPolicy) -> CoordinationClient {
    CoordinationClient::connect(ensemble.address(), policy)
        .await
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_independent_ensembles_do_not_share_state() {
    let first = MemoryEnsemble::new();
    let second = MemoryEnsemble::new();

    let a = connected(&first, bounded()).await;
    let b = connected(&second, bounded()).await;

    a.ensure_path("/ns").await.unwrap();
    a.create("/ns/x", b"first", CreateMode::Ephemeral)
        .await
        .unwrap();
    b.ensure_path("/ns").await.unwrap();
    b.create("/ns/x", b"second", CreateMode::Ephemeral)
        .await
        .unwrap();

    assert_eq!(a.get_data("/ns/x").await.unwrap(), b"first");
    assert_eq!(b.get_data("/ns/x").await.unwrap(), b"second");

    a.close();
    assert!(!first.node_exists("/ns/x"));
    assert!(second.node_exists("/ns/x"));
}

#[tokio::test]
async fn test_session_survives_restart() {
    let ensemble = MemoryEnsemble::new();
    let client = connected(&ensemble, bounded()).await;
    client
        .create("/eph", b"", CreateMode::Ephemeral)
        .await
        .unwrap();

    ensemble.restart();

    assert!(client.is_connected(Duration::from_secs(1)).await);
    assert!(client.exists("/eph").await.unwrap());
}

#[tokio::test]
async fn test_status_tracks_ensemble_state() {
    let ensemble = MemoryEnsemble::new();
    let client = connected(&ensemble, bounded()).await;
    assert!(client.is_connected(Duration::from_millis(100)).await);

    ensemble.stop();
    assert!(!client.is_connected(Duration::from_millis(50)).await);

    ensemble.start();
    assert!(client.is_connected(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_bounded_operation_gives_up_while_stopped() {
    let ensemble = MemoryEnsemble::new();
    let client = connected(&ensemble, bounded()).await;

    ensemble.stop();
    assert!(matches!(
        client.children("/").await,
        Err(CoordError::ConnectionLoss { .. })
    ));
}

#[tokio::test]
async fn test_expired_session_is_not_retried() {
    let ensemble = MemoryEnsemble::new();
    let client = connected(&ensemble, RetryPolicy::forever(1)).await;
    assert!(client.is_connected(Duration::from_secs(1)).await);
    let session_id = client.session_id().unwrap();

    client
        .create("/eph", b"", CreateMode::Ephemeral)
        .await
        .unwrap();
    assert!(ensemble.expire_session(session_id));

    assert!(!ensemble.node_exists("/eph"));
    assert_eq!(
        client.exists("/eph").await,
        Err(CoordError::SessionExpired { session_id })
    );
    assert!(!client.is_connected(Duration::from_millis(10)).await);
}

#[tokio::test]
async fn test_session_timeout_option_is_accepted() {
    let ensemble = MemoryEnsemble::new();
    let client = CoordinationClient::connect_with(
        ensemble.address(),
        bounded(),
        ClientOptions::default().with_session_timeout_ms(500),
    )
    .await
    .unwrap();
    assert!(client.is_connected(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_many_clients_release_their_sessions() {
    let ensemble = MemoryEnsemble::new();

    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(connected(&ensemble, bounded()).await);
    }
    assert_eq!(ensemble.live_sessions().len(), 8);

    clients.truncate(3);
    assert_eq!(ensemble.live_sessions().len(), 3);

    drop(clients);
    assert!(ensemble.live_sessions().is_empty());
}
