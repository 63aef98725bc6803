//! Per-state timeout tests
//!
//! Run on paused time so dwell limits elapse instantly.


use integration_harness::{
    HangingCloseConnector, KEY, PeerBehavior, expect_state, services, spawn_peer,
    stalling_services, test_config,
};
use remdesk_client::{
    ErrorKind, NO_ERROR, NullDataPlane, PresharedKeyAuthenticator, RuntimeHandle, Services,
    SessionState,
};
use remdesk_transport::MemoryNetwork;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let runtime = RuntimeHandle::init(test_config(), stalling_services());
    let started = Instant::now();

    let id = runtime.start_session("peer-42").unwrap();
    expect_state(&runtime, id, SessionState::Failed).await;

    assert!(started.elapsed() >= Duration::from_millis(2_000));
    let error = runtime.last_error(id).unwrap();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(runtime.get_error(id).starts_with("Timeout: connecting"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connecting_wins_over_timeout() {
    let runtime = RuntimeHandle::init(test_config(), stalling_services());

    let id = runtime.start_session("peer-42").unwrap();
    expect_state(&runtime, id, SessionState::Connecting).await;
    runtime.stop_session(id).unwrap();

    expect_state(&runtime, id, SessionState::Closed).await;
    assert_eq!(runtime.get_error(id), NO_ERROR);
}

#[tokio::test(start_paused = true)]
async fn test_auth_timeout() {
    let network = MemoryNetwork::new();
    let _peer = spawn_peer(&network, "peer-42", KEY, PeerBehavior::Silent);
    let runtime = RuntimeHandle::init(test_config(), services(&network));

    let id = runtime.start_session("peer-42").unwrap();
    expect_state(&runtime, id, SessionState::Authenticating).await;
    expect_state(&runtime, id, SessionState::Failed).await;

    assert_eq!(runtime.last_error(id).unwrap().kind(), ErrorKind::Timeout);
    assert!(runtime.get_error(id).contains("authenticating"));
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_without_peer_traffic() {
    let network = MemoryNetwork::new();
    let _peer = spawn_peer(&network, "peer-42", KEY, PeerBehavior::Mute);
    let runtime = RuntimeHandle::init(test_config(), services(&network));

    let id = runtime.start_session("peer-42").unwrap();
    expect_state(&runtime, id, SessionState::Active).await;
    let active_at = Instant::now();

    expect_state(&runtime, id, SessionState::Failed).await;
    assert!(active_at.elapsed() >= Duration::from_millis(6_000));
    assert_eq!(runtime.last_error(id).unwrap().kind(), ErrorKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_keeps_session_alive() {
    let network = MemoryNetwork::new();
    let peer = spawn_peer(&network, "peer-42", KEY, PeerBehavior::Echo);
    let runtime = RuntimeHandle::init(test_config(), services(&network));

    let id = runtime.start_session("peer-42").unwrap();
    expect_state(&runtime, id, SessionState::Active).await;

    // Five idle timeouts' worth of time
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(runtime.state(id).unwrap(), SessionState::Active);
    assert!(peer.stats.pings.load(Ordering::SeqCst) >= 10);
    assert_eq!(runtime.get_error(id), NO_ERROR);
}

#[tokio::test(start_paused = true)]
async fn test_closing_timeout_still_reaches_closed() {
    let network = MemoryNetwork::new();
    let _peer = spawn_peer(&network, "peer-42", KEY, PeerBehavior::Echo);
    let services = Services::new(
        Arc::new(HangingCloseConnector {
            network: network.clone(),
        }),
        Arc::new(PresharedKeyAuthenticator::new("test-client", KEY.to_vec())),
        Arc::new(NullDataPlane),
    );
    let runtime = RuntimeHandle::init(test_config(), services);

    let id = runtime.start_session("peer-42").unwrap();
    expect_state(&runtime, id, SessionState::Active).await;

    let stopped_at = Instant::now();
    runtime.stop_session(id).unwrap();
    expect_state(&runtime, id, SessionState::Closing).await;
    expect_state(&runtime, id, SessionState::Closed).await;

    assert!(stopped_at.elapsed() >= Duration::from_millis(500));
    // Dropping a stuck transport is not a session failure
    assert_eq!(runtime.get_error(id), NO_ERROR);
}
