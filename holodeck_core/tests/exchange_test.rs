// Buffer exchange between a client and a simulated engine thread
#![cfg(unix)]

use holodeck_core::memory::platform::{memory_name, CLIENT_SEMAPHORE, SERVER_SEMAPHORE};
use holodeck_core::memory::ShmRegion;
use holodeck_core::{
    default_backend, ClientConfig, DType, HolodeckClient, HolodeckResult, PeerSession,
    TimeoutPolicy, TurnState,
};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn unique_session(tag: &str) -> String {
    format!("{}{}", tag, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

fn client_config(session: &str) -> ClientConfig {
    ClientConfig::new(session).with_timeout(TimeoutPolicy::Bounded(WAIT))
}

/// Remove leftovers of an earlier crashed run of a fixed-name session
fn scrub(session: &str, keys: &[&str]) {
    let backend = default_backend().unwrap();
    let _ = backend.remove(SERVER_SEMAPHORE, session);
    let _ = backend.remove(CLIENT_SEMAPHORE, session);
    for key in keys {
        let _ = ShmRegion::unlink_name(&memory_name(session, key));
    }
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn test_command_and_state_round_trip() {
    let session = "abc";
    scrub(session, &["cmd", "state"]);

    let peer = PeerSession::create(session).unwrap();
    let mut client = HolodeckClient::new(client_config(session)).unwrap();
    assert_eq!(client.state(), TurnState::ClientTurn);

    client
        .allocate("cmd", &[4], DType::F32)
        .unwrap()
        .write(&[0.0f32, 0.0, 2.0, 1000.0])
        .unwrap();
    client.allocate("state", &[3], DType::F32).unwrap();
    client.release().unwrap();
    assert_eq!(client.state(), TurnState::WaitingForPeer);

    let written = [1.5f32, -0.0, f32::from_bits(0x7fc0_0001)];
    let engine = thread::spawn(move || -> HolodeckResult<(PeerSession, Vec<f32>)> {
        let mut peer = peer;
        let mut seen = Vec::new();
        peer.serve(Some(WAIT), |peer| {
            seen = peer.attach("cmd", &[4], DType::F32)?.to_vec::<f32>()?;
            peer.attach("state", &[3], DType::F32)?.write(&written)?;
            Ok(())
        })?;
        Ok((peer, seen))
    });

    client.acquire().unwrap();
    assert_eq!(client.state(), TurnState::ClientTurn);

    let (peer, seen) = engine.join().unwrap().unwrap();
    assert_eq!(bits(&seen), bits(&[0.0, 0.0, 2.0, 1000.0]));

    let state = client.buffer("state").unwrap().to_vec::<f32>().unwrap();
    assert_eq!(bits(&state), bits(&written));

    client.teardown();
    drop(peer);
}

#[test]
fn test_lockstep_ticks() {
    let session = unique_session("tick");
    let mut peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(client_config(&session)).unwrap();
    client.allocate("step", &[1], DType::U64).unwrap();
    client.allocate("echo", &[1], DType::U64).unwrap();

    const STEPS: u64 = 50;
    let engine = thread::spawn(move || -> HolodeckResult<()> {
        for _ in 0..STEPS {
            peer.serve(Some(WAIT), |peer| {
                let step = peer.attach("step", &[1], DType::U64)?.to_vec::<u64>()?[0];
                peer.attach("echo", &[1], DType::U64)?.write(&[step * 2])?;
                Ok(())
            })?;
        }
        Ok(())
    });

    for step in 0..STEPS {
        client.act("step", &[step]).unwrap();
        client.tick().unwrap();
        let echo = client.buffer("echo").unwrap().as_slice::<u64>().unwrap()[0];
        assert_eq!(echo, step * 2);
    }

    engine.join().unwrap().unwrap();
}

#[test]
fn test_typed_allocation_and_bool_buffers() {
    let session = unique_session("typed");
    let peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(client_config(&session)).unwrap();

    let pixels = client.allocate_typed::<u8>("RGBCamera", &[4, 4, 4]).unwrap();
    assert_eq!(pixels.len(), 64);
    pixels.fill(255);

    let terminal = client.allocate("terminal", &[1], DType::Bool).unwrap();
    terminal.write(&[1u8]).unwrap();
    assert_eq!(terminal.dtype(), DType::Bool);

    assert!(client.act("RGBCamera", &[0u8; 3]).is_err());
    assert!(client.act("unknown", &[0u8]).is_err());

    client.teardown();
    drop(peer);
}

#[test]
fn test_sessions_are_isolated() {
    let first = unique_session("iso");
    let second = unique_session("iso");
    let _peer_a = PeerSession::create(&first).unwrap();
    let _peer_b = PeerSession::create(&second).unwrap();

    let mut a = HolodeckClient::new(client_config(&first)).unwrap();
    let mut b = HolodeckClient::new(client_config(&second)).unwrap();

    a.allocate("cmd", &[2], DType::I32).unwrap().write(&[1i32, 2]).unwrap();
    b.allocate("cmd", &[2], DType::I32).unwrap().write(&[3i32, 4]).unwrap();

    assert_eq!(a.buffer("cmd").unwrap().to_vec::<i32>().unwrap(), vec![1, 2]);
    assert_eq!(b.buffer("cmd").unwrap().to_vec::<i32>().unwrap(), vec![3, 4]);
    assert_ne!(a.buffer("cmd").unwrap().name(), b.buffer("cmd").unwrap().name());
}

#[test]
fn test_reallocation_is_seen_after_reattach() {
    let session = unique_session("realloc");
    let mut peer = PeerSession::create(&session).unwrap();
    let mut client = HolodeckClient::new(client_config(&session)).unwrap();

    client.allocate("lidar", &[8], DType::F32).unwrap();
    let old_size = peer.attach("lidar", &[8], DType::F32).unwrap().byte_len();
    assert_eq!(old_size, 32);

    client
        .allocate("lidar", &[16], DType::F64)
        .unwrap()
        .write(&[7.0f64; 16])
        .unwrap();

    // the engine's old mapping no longer refers to the live region
    let fresh = peer.attach("lidar", &[16], DType::F64).unwrap();
    assert_eq!(fresh.to_vec::<f64>().unwrap(), vec![7.0; 16]);
}
