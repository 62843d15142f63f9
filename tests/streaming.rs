// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

extern crate bytes;
extern crate hex_literal;
extern crate natnet;

use std::{
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use bytes::Bytes;
use hex_literal::hex;
use natnet::{
    codec::encode_packet,
    transport::mock::{MockServer, MockTransport},
    Command, DataFrame, FrameInfo, Marker, MotionClient, MotionListener, NatNetError, Packet,
    ProtocolVersion, Quat, RigidBody, Rules, ServerInfo, SessionState, Skeleton, TimeInfo,
    TransportError, UsageError, Vec3,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Version(ServerInfo),
    Frame(i32),
    RigidBodies(Vec<RigidBody>),
    Skeletons(usize),
    LabeledMarkers(usize),
    UnlabeledMarkers(usize),
    Disconnect,
}

/// Records every callback with the thread it ran on.
#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<(Call, ThreadId)>>>);

impl Log {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push((call, thread::current().id()));
    }

    fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn threads(&self) -> Vec<ThreadId> {
        self.0.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    fn wait_until<F: Fn(&[Call]) -> bool>(&self, done: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(&self.calls()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl MotionListener for Log {
    fn on_version(&mut self, server_info: &ServerInfo) {
        self.push(Call::Version(server_info.clone()));
    }
    fn on_frame_info(&mut self, frame_info: &FrameInfo) {
        self.push(Call::Frame(frame_info.frame_number));
    }
    fn on_rigid_bodies(&mut self, rigid_bodies: &[RigidBody], _: &TimeInfo) {
        self.push(Call::RigidBodies(rigid_bodies.to_vec()));
    }
    fn on_skeletons(&mut self, skeletons: &[Skeleton], _: &TimeInfo) {
        self.push(Call::Skeletons(skeletons.len()));
    }
    fn on_labeled_markers(&mut self, markers: &[Marker], _: &TimeInfo) {
        self.push(Call::LabeledMarkers(markers.len()));
    }
    fn on_unlabeled_markers(&mut self, markers: &[Marker], _: &TimeInfo) {
        self.push(Call::UnlabeledMarkers(markers.len()));
    }
    fn on_disconnect(&mut self, _: Option<&TransportError>) {
        self.push(Call::Disconnect);
    }
}

fn motive_3_1() -> ServerInfo {
    ServerInfo::new(
        "Motive",
        ProtocolVersion::new(3, 1, 0, 0),
        ProtocolVersion::new(3, 1, 0, 0),
    )
}

fn rules() -> Rules {
    Rules::new(motive_3_1().natnet_version)
}

/// A client streaming from a mock server that answered the handshake.
fn streaming(log: &Log) -> (MotionClient, MockServer) {
    let (transport, server) = MockTransport::pair();
    server
        .send_packet(&Packet::ServerInfo(motive_3_1()), &rules())
        .unwrap();
    let mut client = MotionClient::new(log.clone());
    client
        .connect_with(Arc::new(transport), Duration::from_secs(1))
        .unwrap();
    client.request_data().unwrap();
    assert_eq!(client.state(), SessionState::Streaming);
    (client, server)
}

fn frame(frame_number: i32, rigid_bodies: Vec<RigidBody>) -> Packet {
    Packet::DataFrame(DataFrame {
        frame_number,
        rigid_bodies,
        ..Default::default()
    })
}

fn frames_seen(calls: &[Call]) -> Vec<i32> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Frame(n) => Some(*n),
            _ => None,
        })
        .collect()
}

#[test]
fn motive_scenario() {
    let log = Log::default();
    let (mut client, server) = streaming(&log);
    let mut body = RigidBody::new(1, Vec3::new(0.0, 1.5, 0.0), Quat::new(0.0, 0.0, 0.0, 1.0));
    body.mean_error = Some(0.0);
    server.send_packet(&frame(1, vec![body.clone()]), &rules()).unwrap();
    log.wait_until(|calls| calls.len() >= 6);
    client.disconnect();

    let calls = log.calls();
    let versions = calls
        .iter()
        .filter(|c| matches!(c, Call::Version(_)))
        .count();
    let rigid_body_calls = calls
        .iter()
        .filter(|c| matches!(c, Call::RigidBodies(_)))
        .count();
    assert_eq!(versions, 1);
    assert_eq!(rigid_body_calls, 1);
    assert_eq!(
        calls,
        vec![
            Call::Version(motive_3_1()),
            Call::Frame(1),
            Call::RigidBodies(vec![body]),
            Call::Skeletons(0),
            Call::LabeledMarkers(0),
            Call::UnlabeledMarkers(0),
            Call::Disconnect,
        ]
    );
    match &calls[2] {
        Call::RigidBodies(bodies) => {
            assert_eq!(bodies.len(), 1);
            assert_eq!(bodies[0].id, 1);
            assert_eq!(bodies[0].position, Vec3::new(0.0, 1.5, 0.0));
            assert_eq!(bodies[0].orientation, Quat::new(0.0, 0.0, 0.0, 1.0));
            assert!(bodies[0].tracking_valid);
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[test]
fn ordered_on_one_background_thread() {
    let log = Log::default();
    let (mut client, server) = streaming(&log);
    for n in 1..=50 {
        server.send_packet(&frame(n, Vec::new()), &rules()).unwrap();
    }
    log.wait_until(|calls| frames_seen(calls).len() >= 50);
    client.disconnect();

    assert_eq!(frames_seen(&log.calls()), (1..=50).collect::<Vec<_>>());
    let threads = log.threads();
    assert!(threads.iter().all(|t| *t == threads[0]));
    assert_ne!(threads[0], thread::current().id());
}

#[test]
fn unknown_type_skipped() {
    let log = Log::default();
    let (mut client, server) = streaming(&log);
    server.send_packet(&frame(1, Vec::new()), &rules()).unwrap();
    server.send_raw(Bytes::copy_from_slice(&hex!("63 00 02 00 ab cd")));
    server.send_packet(&frame(2, Vec::new()), &rules()).unwrap();
    log.wait_until(|calls| frames_seen(calls).len() >= 2);
    client.disconnect();

    let calls = log.calls();
    assert_eq!(frames_seen(&calls), vec![1, 2]);
    // version, two frames of five callbacks each, disconnect
    assert_eq!(calls.len(), 1 + 2 * 5 + 1);
}

#[test]
fn disconnect_is_prompt_and_final() {
    let log = Log::default();
    let (mut client, server) = streaming(&log);
    log.wait_until(|calls| !calls.is_empty());

    let start = Instant::now();
    client.disconnect();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(client.state(), SessionState::Idle);

    let seen = log.calls().len();
    server.send_packet(&frame(1, Vec::new()), &rules()).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(log.calls().len(), seen);
    assert_eq!(log.calls().last(), Some(&Call::Disconnect));

    let commands = server.drain_commands();
    assert_eq!(
        commands,
        vec![
            Command::Connect,
            Command::RequestFrameOfData,
            Command::Disconnect
        ]
    );
}

#[test]
fn server_loss_ends_stream() {
    let log = Log::default();
    let (mut client, server) = streaming(&log);
    log.wait_until(|calls| !calls.is_empty());
    drop(server);
    log.wait_until(|calls| calls.contains(&Call::Disconnect));
    assert_eq!(log.calls().last(), Some(&Call::Disconnect));

    let deadline = Instant::now() + Duration::from_secs(2);
    while client.state() != SessionState::Idle && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(client.state(), SessionState::Idle);
    assert!(matches!(
        client.request_data(),
        Err(NatNetError::Usage(UsageError::NotConnected))
    ));
}

#[test]
fn listener_reused_after_reconnect() {
    let log = Log::default();
    let (mut client, _server) = streaming(&log);
    log.wait_until(|calls| !calls.is_empty());
    client.disconnect();

    let (transport, server) = MockTransport::pair();
    server
        .send_packet(&Packet::ServerInfo(motive_3_1()), &rules())
        .unwrap();
    client
        .connect_with(Arc::new(transport), Duration::from_secs(1))
        .unwrap();
    client.request_data().unwrap();
    log.wait_until(|calls| {
        calls
            .iter()
            .filter(|c| matches!(c, Call::Version(_)))
            .count()
            >= 2
    });
    client.disconnect();
    let versions = log
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Version(_)))
        .count();
    assert_eq!(versions, 2);
}

#[test]
fn old_server_frames() {
    let log = Log::default();
    let (transport, server) = MockTransport::pair();
    let old = ServerInfo::new(
        "Motive",
        ProtocolVersion::major_minor(1, 9),
        ProtocolVersion::major_minor(2, 5),
    );
    let old_rules = Rules::new(old.natnet_version);
    server
        .send_packet(&Packet::ServerInfo(old.clone()), &old_rules)
        .unwrap();
    let mut client = MotionClient::new(log.clone());
    assert_eq!(
        client
            .connect_with(Arc::new(transport), Duration::from_secs(1))
            .unwrap(),
        old
    );
    client.request_data().unwrap();
    let mut body = RigidBody::new(7, Vec3::new(1.0, 2.0, 3.0), Quat::identity());
    body.mean_error = Some(0.001);
    server
        .send_raw(encode_packet(&frame(3, vec![body.clone()]), &old_rules).unwrap());
    log.wait_until(|calls| frames_seen(calls).len() >= 1);
    client.disconnect();
    assert!(log.calls().contains(&Call::RigidBodies(vec![body])));
}
