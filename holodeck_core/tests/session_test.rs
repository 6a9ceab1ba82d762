// Handshake protocol, timeouts and teardown of a client session
#![cfg(unix)]

use holodeck_core::{
    ClientConfig, DType, HolodeckClient, HolodeckError, InitialTurn, PeerSession, SharedBuffer,
    TimeoutPolicy, TurnState,
};
use std::time::Duration;

fn unique_session(tag: &str) -> String {
    format!("{}{}", tag, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

fn assert_state_error<T: std::fmt::Debug>(result: Result<T, HolodeckError>) {
    match result {
        Err(HolodeckError::State { .. }) => {}
        other => panic!("expected state error, got {:?}", other),
    }
}

#[test]
fn test_client_requires_engine_semaphores() {
    let session = unique_session("early");
    let err = HolodeckClient::new(ClientConfig::new(&session)).unwrap_err();
    assert!(matches!(err, HolodeckError::Initialization { .. }));

    let _peer = PeerSession::create(&session).unwrap();
    assert!(HolodeckClient::new(ClientConfig::new(&session)).is_ok());
}

#[test]
fn test_bounded_acquire_times_out_and_is_retryable() {
    let session = unique_session("timeout");
    let peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(
        ClientConfig::new(&session).with_timeout(TimeoutPolicy::Bounded(Duration::from_millis(50))),
    )
    .unwrap();

    if !client.supports_timeout() {
        // the backend cannot bound the wait; acquire would block forever
        return;
    }

    client.release().unwrap();
    let err = client.acquire().unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {:?}", err);
    assert_eq!(client.state(), TurnState::WaitingForPeer);

    // still waiting: releasing again would desynchronize the handshake
    assert_state_error(client.release());

    peer.wait_for_client(Some(Duration::from_secs(5))).unwrap();
    peer.signal_client().unwrap();
    client.acquire().unwrap();
    assert_eq!(client.state(), TurnState::ClientTurn);
}

#[test]
fn test_out_of_order_handshake_is_rejected() {
    let session = unique_session("order");
    let _peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(ClientConfig::new(&session)).unwrap();

    assert_state_error(client.acquire());
    assert_eq!(client.state(), TurnState::ClientTurn);

    client.release().unwrap();
    assert_state_error(client.release());
    assert_eq!(client.state(), TurnState::WaitingForPeer);
}

#[test]
fn test_engine_first_session_starts_waiting() {
    let session = unique_session("first");
    let peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(
        ClientConfig::new(&session)
            .with_initial_turn(InitialTurn::Peer)
            .with_timeout(TimeoutPolicy::Bounded(Duration::from_secs(10))),
    )
    .unwrap();
    assert_eq!(client.state(), TurnState::WaitingForPeer);
    assert_state_error(client.release());

    // engine reports ready
    peer.signal_client().unwrap();
    client.acquire().unwrap();
    assert_eq!(client.state(), TurnState::ClientTurn);
}

#[test]
fn test_teardown_is_idempotent_and_leaves_nothing_behind() {
    let session = unique_session("teardown");
    let peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(ClientConfig::new(&session)).unwrap();
    client.allocate("cmd", &[4], DType::F32).unwrap();
    client.allocate("state", &[2, 2], DType::F64).unwrap();
    client.release().unwrap();

    client.teardown();
    assert_eq!(client.state(), TurnState::TornDown);
    client.teardown();
    assert_eq!(client.state(), TurnState::TornDown);
    assert!(client.buffers().is_empty());

    assert_state_error(client.release());
    assert_state_error(client.acquire());
    assert_state_error(client.tick());
    assert_state_error(client.allocate("cmd", &[4], DType::F32));
    assert_state_error(client.act("cmd", &[0.0f32; 4]));

    // the client alone removed every name: the engine, still holding its
    // handles, can start the same session again
    assert!(SharedBuffer::attach(&session, "cmd", &[4], DType::F32).is_err());
    assert!(SharedBuffer::attach(&session, "state", &[2, 2], DType::F64).is_err());
    let restarted = PeerSession::create(&session);
    assert!(restarted.is_ok(), "stale semaphores: {:?}", restarted.as_ref().err());

    drop(restarted);
    drop(peer);
}

#[test]
fn test_drop_tears_down() {
    let session = unique_session("drop");
    let _peer = PeerSession::create(&session).unwrap();
    {
        let mut client = HolodeckClient::new(ClientConfig::new(&session)).unwrap();
        client.allocate("cmd", &[1], DType::U8).unwrap();
        assert!(SharedBuffer::attach(&session, "cmd", &[1], DType::U8).is_ok());
    }
    assert!(SharedBuffer::attach(&session, "cmd", &[1], DType::U8).is_err());
}
