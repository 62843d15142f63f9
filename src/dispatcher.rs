// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! The background thread that receives, decodes, and dispatches packets.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, RecvTimeoutError, Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::{
    codec::{Command, Packet, PacketDecoder},
    data_types::ServerInfo,
    error::{DecodeError, NegotiationError, TransportError},
    listener::{dispatch_packet, MotionListener},
    negotiation::Session,
    transport::{Datagram, FrameReader, Transport},
};

const THREAD_NAME: &str = "natnet-dispatch";

/// How long `stop` waits for a running callback once the thread wait is over.
const GATE_GRACE: Duration = Duration::from_millis(50);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Negotiating,
    /// Negotiated, not yet streaming.
    Connected,
    Streaming,
    Stopping,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Session state shared between the control thread and the stream thread.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<SessionState>>);

impl SharedState {
    pub fn get(&self) -> SessionState {
        *lock(&self.0)
    }

    pub fn set(&self, state: SessionState) {
        let mut current = lock(&self.0);
        if *current != state {
            trace!(from = %*current, to = %state, "session state");
            *current = state;
        }
    }

    /// Move to `to` only if currently in `from`.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut current = lock(&self.0);
        if *current == from {
            trace!(%from, %to, "session state");
            *current = to;
            true
        } else {
            false
        }
    }
}

/// How a frame number relates to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceCheck {
    First,
    Next,
    /// Frames were skipped, `missed` of them.
    Gap { missed: i64 },
    Duplicate,
    OutOfOrder,
    /// Jumped far backwards, as when the server restarts its count.
    Reset,
}

/// Furthest a late frame may trail the newest one and still count as reordered.
const REORDER_WINDOW: i32 = 100;

/// Tracks frame numbers to spot drops and reordering.
///
/// Distances are taken modulo 2^32, so counting past `i32::MAX` into
/// `i32::MIN` is ordinary progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSequence {
    last: Option<i32>,
}

impl FrameSequence {
    pub fn check(&mut self, frame_number: i32) -> SequenceCheck {
        let result = match self.last {
            None => SequenceCheck::First,
            Some(last) => match frame_number.wrapping_sub(last) {
                1 => SequenceCheck::Next,
                0 => SequenceCheck::Duplicate,
                d if d < 0 && d >= -REORDER_WINDOW => SequenceCheck::OutOfOrder,
                d if d < 0 => SequenceCheck::Reset,
                d => SequenceCheck::Gap {
                    missed: i64::from(d) - 1,
                },
            },
        };
        if result != SequenceCheck::OutOfOrder {
            self.last = Some(frame_number);
        }
        result
    }
}

/// Timing for the stream thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        DispatcherOptions {
            poll_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// The listener, present only while callbacks are allowed.
type Gate = Mutex<Option<Box<dyn MotionListener>>>;

struct Shared {
    state: SharedState,
    gate: Gate,
    stopping: AtomicBool,
    /// `stop` gave up waiting on a busy callback: deliver nothing more.
    detached: AtomicBool,
    /// `stop` ran inside a callback, so the stream thread settles the final state.
    settle_in_worker: AtomicBool,
    waiters: Mutex<Vec<Sender<ServerInfo>>>,
}

impl Shared {
    fn notify_server_info(&self, server_info: &ServerInfo) {
        for waiter in lock(&self.waiters).drain(..) {
            let _ = waiter.try_send(server_info.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    GateClosed,
    Panicked,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Why the stream loop ended.
enum End {
    Transport(TransportError),
    Panicked,
    GateClosed,
}

struct Worker {
    shared: Arc<Shared>,
    reader: FrameReader,
    decoder: PacketDecoder,
    server_info: ServerInfo,
    sequence: FrameSequence,
}

impl Worker {
    /// Run one callback under the gate, catching panics.
    fn deliver<F>(&self, f: F) -> Delivery
    where
        F: FnOnce(&mut dyn MotionListener),
    {
        let mut gate = lock(&self.shared.gate);
        let listener = match gate.as_mut() {
            Some(_) if self.shared.detached.load(Ordering::SeqCst) => {
                return Delivery::GateClosed
            }
            Some(listener) => listener,
            None => return Delivery::GateClosed,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_mut()))) {
            Ok(()) => Delivery::Delivered,
            Err(payload) => {
                error!(panic = panic_message(payload.as_ref()), "listener panicked");
                Delivery::Panicked
            }
        }
    }

    fn run(mut self) {
        info!(version = %self.decoder.version(), "stream started");
        let server_info = self.server_info.clone();
        let end = match self.deliver(|l| l.on_version(&server_info)) {
            Delivery::Delivered => self.stream(),
            Delivery::GateClosed => End::GateClosed,
            Delivery::Panicked => End::Panicked,
        };
        self.finish(end);
    }

    fn stream(&mut self) -> End {
        loop {
            let datagram = match self.reader.read() {
                Ok(Some(datagram)) => datagram,
                Ok(None) => continue,
                Err(e) => return End::Transport(e),
            };
            match self.handle(datagram) {
                Delivery::Delivered => {}
                Delivery::GateClosed => return End::GateClosed,
                Delivery::Panicked => return End::Panicked,
            }
        }
    }

    fn handle(&mut self, datagram: Datagram) -> Delivery {
        let mut packet = match self.decoder.decode(&datagram.payload) {
            Ok(packet) => packet,
            Err(DecodeError::UnknownMessageType(message_id)) => {
                debug!(message_id, "skipping unknown message type");
                return Delivery::Delivered;
            }
            Err(e) => {
                warn!(error = %e, len = datagram.payload.len(), "failed to decode packet");
                return self.deliver(|l| l.on_decode_error(&e));
            }
        };
        match &mut packet {
            Packet::DataFrame(frame) => {
                frame.time_info.received_at = Some(datagram.received_at);
                self.check_sequence(frame.frame_number);
            }
            Packet::ServerInfo(server_info) => self.shared.notify_server_info(server_info),
            _ => {}
        }
        self.deliver(|l| dispatch_packet(l, &packet))
    }

    fn check_sequence(&mut self, frame: i32) {
        match self.sequence.check(frame) {
            SequenceCheck::First | SequenceCheck::Next => {}
            SequenceCheck::Gap { missed } => debug!(frame, missed, "frames missed"),
            SequenceCheck::Duplicate => warn!(frame, "duplicate frame"),
            SequenceCheck::OutOfOrder => warn!(frame, "frame out of order"),
            SequenceCheck::Reset => info!(frame, "frame numbering restarted"),
        }
    }

    fn finish(self, end: End) {
        let requested = self.shared.stopping.swap(true, Ordering::SeqCst);
        if !requested {
            self.shared.state.set(SessionState::Stopping);
            self.reader.transport().close();
        }
        match end {
            End::Transport(e) if !requested => {
                error!(error = %e, "transport failed, stopping stream");
                self.deliver(|l| l.on_disconnect(Some(&e)));
            }
            End::Transport(_) | End::Panicked => {
                self.deliver(|l| l.on_disconnect(None));
            }
            End::GateClosed => {}
        }
        if !requested {
            self.shared.state.set(SessionState::Idle);
        } else if self.shared.settle_in_worker.load(Ordering::SeqCst) {
            self.shared
                .state
                .transition(SessionState::Stopping, SessionState::Idle);
        }
        info!("stream stopped");
    }
}

/// Owns the stream thread of one session.
pub struct StreamDispatcher {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    exited: Receiver<()>,
    stop_timeout: Duration,
    stopped: bool,
}

impl fmt::Debug for StreamDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDispatcher")
            .field("state", &self.shared.state.get())
            .field("thread_id", &self.thread_id)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl StreamDispatcher {
    /// Spawn the stream thread and return immediately.
    ///
    /// The thread delivers `on_version` first, then every packet in arrival order.
    /// `state` is set to `Streaming`.
    pub fn start(
        transport: Arc<dyn Transport>,
        session: Session,
        listener: Box<dyn MotionListener>,
        state: SharedState,
        options: DispatcherOptions,
    ) -> Result<StreamDispatcher, TransportError> {
        state.set(SessionState::Streaming);
        let shared = Arc::new(Shared {
            state,
            gate: Mutex::new(Some(listener)),
            stopping: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            settle_in_worker: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        });
        let worker = Worker {
            shared: Arc::clone(&shared),
            reader: FrameReader::new(Arc::clone(&transport), options.poll_interval),
            decoder: session.decoder,
            server_info: session.server_info,
            sequence: FrameSequence::default(),
        };
        let (exit_tx, exited) = bounded::<()>(0);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                // Dropped on exit, which wakes `stop`.
                let _exit_tx = exit_tx;
                worker.run();
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                shared.state.set(SessionState::Connected);
                return Err(e.into());
            }
        };
        Ok(StreamDispatcher {
            thread_id: thread.thread().id(),
            thread: Some(thread),
            shared,
            transport,
            exited,
            stop_timeout: options.stop_timeout,
            stopped: false,
        })
    }

    /// Whether the stream thread is still running.
    pub fn is_running(&self) -> bool {
        !self.stopped && !self.shared.stopping.load(Ordering::SeqCst)
    }

    /// Ask the server to identify itself and wait for the answer,
    /// which the stream thread also delivers to `on_version`.
    pub fn request_server_info(&self, timeout: Duration) -> Result<ServerInfo, NegotiationError> {
        if !self.is_running() {
            return Err(NegotiationError::NotConnected);
        }
        let (tx, rx) = bounded(1);
        lock(&self.shared.waiters).push(tx);
        self.transport.send(&Command::Connect.to_bytes()?)?;
        match rx.recv_timeout(timeout) {
            Ok(server_info) => Ok(server_info),
            Err(RecvTimeoutError::Timeout) => Err(NegotiationError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(NegotiationError::NotConnected),
        }
    }

    /// Stop the stream thread and hand back the listener.
    ///
    /// No callback starts after this returns. Waits up to the stop timeout
    /// for the thread to exit, then briefly for the listener itself. A
    /// callback that is still running after that keeps the listener: it is
    /// left to the stream thread, which drops it without further callbacks,
    /// and `None` is returned.
    ///
    /// From inside a callback this only requests the stop: the state stays
    /// `Stopping` until the stream thread has delivered `on_disconnect`.
    /// Calling it again returns `None`.
    pub fn stop(&mut self) -> Option<Box<dyn MotionListener>> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        self.shared.stopping.store(true, Ordering::SeqCst);
        let we_stopped = self
            .shared
            .state
            .transition(SessionState::Streaming, SessionState::Stopping);
        self.transport.close();

        if thread::current().id() == self.thread_id {
            // Called from a callback: the gate is held by this very thread.
            debug!("stop requested from inside a callback");
            self.shared.settle_in_worker.store(true, Ordering::SeqCst);
            return None;
        }

        match self.exited.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        error!("stream thread panicked");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.stop_timeout, "stream thread did not exit in time, detaching");
            }
        }

        let listener = self.take_listener();
        if we_stopped {
            self.shared.state.set(SessionState::Idle);
        }
        debug!("dispatcher stopped");
        listener
    }
}

impl StreamDispatcher {
    /// Take the listener back, unless a callback holds it past the grace period.
    fn take_listener(&self) -> Option<Box<dyn MotionListener>> {
        let deadline = Instant::now() + GATE_GRACE;
        loop {
            match self.shared.gate.try_lock() {
                Ok(mut gate) => return gate.take(),
                Err(TryLockError::Poisoned(e)) => return e.into_inner().take(),
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(TryLockError::WouldBlock) => {
                    self.shared.detached.store(true, Ordering::SeqCst);
                    warn!("listener still busy in a callback, leaving it to the stream thread");
                    return None;
                }
            }
        }
    }
}

impl Drop for StreamDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{encode_packet, Response},
        data_types::{DataFrame, ProtocolVersion, Quat, RigidBody, Rules, TimeInfo, Vec3},
        listener::FrameInfo,
        transport::mock::{MockServer, MockTransport},
    };
    use bytes::Bytes;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Version(ServerInfo),
        Frame(i32),
        RigidBodies(Vec<RigidBody>),
        Response(Response),
        DecodeError,
        Disconnect(bool),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(Event, ThreadId)>>>,
        panic_on_frame: Option<i32>,
    }

    impl Recorder {
        fn push(&self, event: Event) {
            lock(&self.events).push((event, thread::current().id()));
        }
        fn events(&self) -> Vec<Event> {
            lock(&self.events).iter().map(|(e, _)| e.clone()).collect()
        }
    }

    impl MotionListener for Recorder {
        fn on_version(&mut self, server_info: &ServerInfo) {
            self.push(Event::Version(server_info.clone()));
        }
        fn on_frame_info(&mut self, frame_info: &FrameInfo) {
            if self.panic_on_frame == Some(frame_info.frame_number) {
                panic!("listener failure");
            }
            self.push(Event::Frame(frame_info.frame_number));
        }
        fn on_rigid_bodies(&mut self, rigid_bodies: &[RigidBody], _: &TimeInfo) {
            if !rigid_bodies.is_empty() {
                self.push(Event::RigidBodies(rigid_bodies.to_vec()));
            }
        }
        fn on_response(&mut self, response: &Response) {
            self.push(Event::Response(response.clone()));
        }
        fn on_decode_error(&mut self, _: &DecodeError) {
            self.push(Event::DecodeError);
        }
        fn on_disconnect(&mut self, error: Option<&TransportError>) {
            self.push(Event::Disconnect(error.is_some()));
        }
    }

    fn version() -> ProtocolVersion {
        ProtocolVersion::major_minor(3, 1)
    }

    fn session() -> Session {
        let server_info = ServerInfo::new("Motive", version(), version());
        Session {
            decoder: PacketDecoder::for_server(&server_info),
            server_info,
        }
    }

    fn options() -> DispatcherOptions {
        DispatcherOptions {
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
        }
    }

    fn start(recorder: &Recorder) -> (StreamDispatcher, MockServer, SharedState) {
        let (transport, server) = MockTransport::pair();
        let state = SharedState::default();
        let dispatcher = StreamDispatcher::start(
            Arc::new(transport),
            session(),
            Box::new(recorder.clone()),
            state.clone(),
            options(),
        )
        .unwrap();
        (dispatcher, server, state)
    }

    fn frame(number: i32) -> Packet {
        Packet::DataFrame(DataFrame {
            frame_number: number,
            ..Default::default()
        })
    }

    fn wait_for(recorder: &Recorder, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while lock(&recorder.events).len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn sequence_checks() {
        let mut sequence = FrameSequence::default();
        assert_eq!(sequence.check(10), SequenceCheck::First);
        assert_eq!(sequence.check(11), SequenceCheck::Next);
        assert_eq!(sequence.check(11), SequenceCheck::Duplicate);
        assert_eq!(sequence.check(14), SequenceCheck::Gap { missed: 2 });
        assert_eq!(sequence.check(12), SequenceCheck::OutOfOrder);
        assert_eq!(sequence.check(15), SequenceCheck::Next);
    }

    #[test]
    fn sequence_wraps_past_max() {
        let mut sequence = FrameSequence::default();
        sequence.check(i32::MAX);
        assert_eq!(sequence.check(i32::MIN), SequenceCheck::Next);
        assert_eq!(sequence.check(i32::MIN + 1), SequenceCheck::Next);
        assert_eq!(sequence.check(i32::MIN + 3), SequenceCheck::Gap { missed: 1 });
        assert_eq!(sequence.check(i32::MIN + 2), SequenceCheck::OutOfOrder);
    }

    #[test]
    fn sequence_restart_reseeds() {
        let mut sequence = FrameSequence::default();
        sequence.check(5000);
        assert_eq!(sequence.check(0), SequenceCheck::Reset);
        assert_eq!(sequence.check(1), SequenceCheck::Next);
        assert_eq!(sequence.check(2), SequenceCheck::Next);
    }

    #[test]
    fn state_transitions() {
        let state = SharedState::default();
        assert_eq!(state.get(), SessionState::Idle);
        assert!(!state.transition(SessionState::Streaming, SessionState::Stopping));
        state.set(SessionState::Streaming);
        assert!(state.transition(SessionState::Streaming, SessionState::Stopping));
        assert_eq!(state.get(), SessionState::Stopping);
    }

    #[test]
    fn delivers_in_order_on_one_thread() {
        let recorder = Recorder::default();
        let (mut dispatcher, server, state) = start(&recorder);
        let rules = Rules::new(version());
        for n in 1..=20 {
            server.send_packet(&frame(n), &rules).unwrap();
        }
        wait_for(&recorder, 21);
        assert_eq!(state.get(), SessionState::Streaming);
        assert!(dispatcher.stop().is_some());
        assert_eq!(state.get(), SessionState::Idle);

        let events = lock(&recorder.events).clone();
        assert_eq!(events[0].0, Event::Version(session().server_info));
        let frames: Vec<_> = events
            .iter()
            .filter_map(|(e, _)| match e {
                Event::Frame(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(frames, (1..=20).collect::<Vec<_>>());
        let thread_id = events[0].1;
        assert_ne!(thread_id, thread::current().id());
        assert!(events.iter().all(|(_, id)| *id == thread_id));
        assert_eq!(events.last().map(|(e, _)| e), Some(&Event::Disconnect(false)));
    }

    #[test]
    fn skips_unknown_and_reports_malformed() {
        let recorder = Recorder::default();
        let (mut dispatcher, server, _state) = start(&recorder);
        let rules = Rules::new(version());
        server.send_raw(Bytes::from_static(b"\x2a\x00\x00\x00"));
        server.send_raw(Bytes::from_static(b"\x07\x00\x02\x00\x01\x00"));
        server
            .send_packet(&Packet::Response(Response::Code(0)), &rules)
            .unwrap();
        wait_for(&recorder, 3);
        dispatcher.stop();
        assert_eq!(
            &recorder.events()[..3],
            &[
                Event::Version(session().server_info),
                Event::DecodeError,
                Event::Response(Response::Code(0)),
            ]
        );
    }

    #[test]
    fn rigid_body_scenario() {
        let recorder = Recorder::default();
        let (mut dispatcher, server, _state) = start(&recorder);
        let mut body = RigidBody::new(1, Vec3::new(0.0, 1.5, 0.0), Quat::new(0.0, 0.0, 0.0, 1.0));
        body.mean_error = Some(0.0);
        let packet = Packet::DataFrame(DataFrame {
            frame_number: 1,
            rigid_bodies: vec![body.clone()],
            ..Default::default()
        });
        server.send_raw(encode_packet(&packet, &Rules::new(version())).unwrap());
        wait_for(&recorder, 3);
        dispatcher.stop();
        assert_eq!(
            recorder.events(),
            vec![
                Event::Version(session().server_info),
                Event::Frame(1),
                Event::RigidBodies(vec![body]),
                Event::Disconnect(false),
            ]
        );
    }

    #[test]
    fn stop_unblocks_and_is_idempotent() {
        let recorder = Recorder::default();
        let (transport, _server) = MockTransport::pair();
        let state = SharedState::default();
        let mut dispatcher = StreamDispatcher::start(
            Arc::new(transport),
            session(),
            Box::new(recorder.clone()),
            state.clone(),
            DispatcherOptions {
                poll_interval: Duration::from_secs(30),
                stop_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();
        wait_for(&recorder, 1);
        let start = Instant::now();
        assert!(dispatcher.stop().is_some());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!dispatcher.is_running());
        let seen = recorder.events().len();
        assert!(dispatcher.stop().is_none());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.events().len(), seen);
        assert_eq!(state.get(), SessionState::Idle);
    }

    #[test]
    fn transport_failure_disconnects() {
        let recorder = Recorder::default();
        let (mut dispatcher, server, state) = start(&recorder);
        wait_for(&recorder, 1);
        drop(server);
        wait_for(&recorder, 2);
        assert_eq!(recorder.events()[1], Event::Disconnect(true));
        let deadline = Instant::now() + Duration::from_secs(2);
        while state.get() != SessionState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(state.get(), SessionState::Idle);
        assert!(dispatcher.stop().is_some());
    }

    #[test]
    fn listener_panic_stops_stream() {
        let recorder = Recorder {
            panic_on_frame: Some(2),
            ..Default::default()
        };
        let (mut dispatcher, server, state) = start(&recorder);
        let rules = Rules::new(version());
        for n in 1..=3 {
            server.send_packet(&frame(n), &rules).unwrap();
        }
        wait_for(&recorder, 3);
        let deadline = Instant::now() + Duration::from_secs(2);
        while state.get() != SessionState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            recorder.events(),
            vec![
                Event::Version(session().server_info),
                Event::Frame(1),
                Event::Disconnect(false),
            ]
        );
        dispatcher.stop();
    }

    #[test]
    fn server_info_while_streaming() {
        let recorder = Recorder::default();
        let (dispatcher, server, _state) = start(&recorder);
        wait_for(&recorder, 1);
        let responder = thread::spawn(move || {
            let command = server.recv_command(Duration::from_secs(2));
            assert_eq!(command, Some(Ok(Command::Connect)));
            server
                .send_packet(
                    &Packet::ServerInfo(session().server_info),
                    &Rules::new(version()),
                )
                .unwrap();
            server
        });
        let info = dispatcher
            .request_server_info(Duration::from_secs(2))
            .unwrap();
        assert_eq!(info, session().server_info);
        let _server = responder.join().unwrap();
    }

    /// Stops its own dispatcher from inside `on_frame_info`, noting the
    /// state each callback sees.
    struct StopsItself {
        dispatcher: Arc<Mutex<Option<StreamDispatcher>>>,
        state: SharedState,
        seen: Arc<Mutex<Vec<(&'static str, SessionState)>>>,
    }

    impl MotionListener for StopsItself {
        fn on_frame_info(&mut self, _: &FrameInfo) {
            if let Some(dispatcher) = lock(&self.dispatcher).as_mut() {
                assert!(dispatcher.stop().is_none());
            }
            lock(&self.seen).push(("frame", self.state.get()));
        }
        fn on_disconnect(&mut self, _: Option<&TransportError>) {
            lock(&self.seen).push(("disconnect", self.state.get()));
        }
    }

    #[test]
    fn stop_inside_callback_settles_after_disconnect() {
        let (transport, server) = MockTransport::pair();
        let state = SharedState::default();
        let slot = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = StopsItself {
            dispatcher: Arc::clone(&slot),
            state: state.clone(),
            seen: Arc::clone(&seen),
        };
        let dispatcher = StreamDispatcher::start(
            Arc::new(transport),
            session(),
            Box::new(listener),
            state.clone(),
            options(),
        )
        .unwrap();
        *lock(&slot) = Some(dispatcher);
        server.send_packet(&frame(1), &Rules::new(version())).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while lock(&seen).len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        while state.get() != SessionState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            *lock(&seen),
            vec![
                ("frame", SessionState::Stopping),
                ("disconnect", SessionState::Stopping),
            ]
        );
        assert_eq!(state.get(), SessionState::Idle);
        let dispatcher = lock(&slot).take();
        drop(dispatcher);
    }

    /// Blocks in `on_frame_info` until released.
    struct Hangs {
        release: Receiver<()>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MotionListener for Hangs {
        fn on_frame_info(&mut self, _: &FrameInfo) {
            lock(&self.calls).push("frame");
            let _ = self.release.recv();
        }
        fn on_disconnect(&mut self, _: Option<&TransportError>) {
            lock(&self.calls).push("disconnect");
        }
    }

    #[test]
    fn stop_is_bounded_by_a_hung_callback() {
        let (transport, server) = MockTransport::pair();
        let (release_tx, release) = bounded(1);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = StreamDispatcher::start(
            Arc::new(transport),
            session(),
            Box::new(Hangs {
                release,
                calls: Arc::clone(&calls),
            }),
            SharedState::default(),
            DispatcherOptions {
                poll_interval: Duration::from_millis(10),
                stop_timeout: Duration::from_millis(100),
            },
        )
        .unwrap();
        server.send_packet(&frame(1), &Rules::new(version())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while lock(&calls).is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let start = Instant::now();
        assert!(dispatcher.stop().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*lock(&calls), vec!["frame"]);
    }
}
