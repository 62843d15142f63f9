// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! An in-memory transport connected to a scripted server, for tests.
//!
//! ```
//! use natnet::transport::{mock::MockTransport, Transport};
//! use std::time::Duration;
//!
//! let (transport, server) = MockTransport::pair();
//! server.send_raw(bytes::Bytes::from_static(b"\x64\x00\x00\x00"));
//! let datagram = transport.receive(Duration::from_millis(10)).unwrap();
//! assert_eq!(datagram.as_deref(), Some(&b"\x64\x00\x00\x00"[..]));
//! ```

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use crossbeam_channel::{select, unbounded, Receiver, Sender};

use super::{Transport, TransportError};
use crate::{
    buffer_unbuffer::BufferUnbufferError,
    codec::{encode_packet, Command, Packet},
    data_types::Rules,
    error::DecodeError,
};

/// Client side of an in-memory connection.
pub struct MockTransport {
    incoming: Receiver<Bytes>,
    outgoing: Sender<Bytes>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    closed: AtomicBool,
}

/// Server side of an in-memory connection.
///
/// Dropping it makes the client's next receive fail with
/// `TransportError::Disconnected` once queued datagrams are drained.
pub struct MockServer {
    to_client: Sender<Bytes>,
    from_client: Receiver<Bytes>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, MockServer) {
        let (to_client, incoming) = unbounded();
        let (outgoing, from_client) = unbounded();
        let (close_tx, close_rx) = unbounded();
        (
            MockTransport {
                incoming,
                outgoing,
                close_tx: Mutex::new(Some(close_tx)),
                close_rx,
                closed: AtomicBool::new(false),
            },
            MockServer {
                to_client,
                from_client,
            },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outgoing
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| TransportError::Disconnected)
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        select! {
            recv(self.incoming) -> msg => msg.map(Some).map_err(|_| TransportError::Disconnected),
            recv(self.close_rx) -> _ => Err(TransportError::Closed),
            default(timeout) => Ok(None),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sender wakes any receive blocked in select.
        let mut close_tx = self.close_tx.lock().unwrap_or_else(|e| e.into_inner());
        close_tx.take();
    }
}

impl MockServer {
    /// Queue a datagram for the client. Ignored once the client is gone.
    pub fn send_raw(&self, data: Bytes) {
        let _ = self.to_client.send(data);
    }

    /// Queue a packet encoded with the given layout rules.
    pub fn send_packet(&self, packet: &Packet, rules: &Rules) -> Result<(), BufferUnbufferError> {
        self.send_raw(encode_packet(packet, rules)?);
        Ok(())
    }

    /// Wait for the next datagram the client sent.
    pub fn recv_raw(&self, timeout: Duration) -> Option<Bytes> {
        self.from_client.recv_timeout(timeout).ok()
    }

    /// Wait for the next command the client sent.
    pub fn recv_command(&self, timeout: Duration) -> Option<Result<Command, DecodeError>> {
        self.recv_raw(timeout).map(|data| Command::decode(&data))
    }

    /// Every command the client has sent so far.
    pub fn drain_commands(&self) -> Vec<Command> {
        self.from_client
            .try_iter()
            .filter_map(|data| Command::decode(&data).ok())
            .collect()
    }
}
