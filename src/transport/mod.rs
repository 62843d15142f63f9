// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Moving datagrams between a client and a server.

mod frame_reader;
pub mod mock;
mod udp;

use std::time::Duration;

use bytes::Bytes;

pub use crate::error::TransportError;
pub use crate::transport::{
    frame_reader::{Datagram, FrameReader},
    udp::UdpTransport,
};

/// A datagram transport, shared between the thread that receives and
/// the thread that sends commands or closes it.
pub trait Transport: Send + Sync {
    /// Send one datagram to the server.
    fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one datagram.
    ///
    /// Returns `Ok(None)` if nothing arrived in time, and
    /// `Err(TransportError::Closed)` once `close` has been called.
    fn receive(&self, timeout: Duration) -> Result<Option<Bytes>, TransportError>;

    /// Release the transport. A receive blocked in another thread returns promptly.
    ///
    /// Calling this more than once has no further effect.
    fn close(&self);
}
