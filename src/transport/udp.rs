// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace, warn};

use super::{Transport, TransportError};
use crate::{
    buffer_unbuffer::constants::MAX_PACKET_SIZE,
    config::{ClientConfig, ConnectionType},
};

/// Longest the data socket blocks before the command socket gets another look.
const RECEIVE_SLICE: Duration = Duration::from_millis(20);

fn make_udp_socket() -> io::Result<Socket> {
    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    Ok(sock)
}

/// Command socket: ephemeral port, may broadcast.
fn make_command_socket(config: &ClientConfig) -> io::Result<UdpSocket> {
    let sock = make_udp_socket()?;
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    sock.bind(&SockAddr::from(addr))?;
    sock.set_broadcast(true)?;
    sock.set_recv_buffer_size(config.receive_buffer_size)?;
    sock.set_nonblocking(true)?;
    Ok(UdpSocket::from(sock))
}

/// Data socket: the configured data port, in the multicast group if there is one.
fn make_data_socket(config: &ClientConfig) -> io::Result<UdpSocket> {
    let sock = make_udp_socket()?;
    let bind_ip = match config.connection {
        ConnectionType::Multicast => Ipv4Addr::UNSPECIFIED,
        ConnectionType::Unicast => config.local,
    };
    sock.bind(&SockAddr::from(SocketAddrV4::new(bind_ip, config.data_port)))?;
    if config.connection == ConnectionType::Multicast {
        sock.join_multicast_v4(&config.multicast_group, &config.local)?;
    }
    sock.set_recv_buffer_size(config.receive_buffer_size)?;
    sock.set_read_timeout(Some(RECEIVE_SLICE))?;
    Ok(UdpSocket::from(sock))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// The pair of UDP sockets a NatNet client uses.
///
/// Commands go out on the command socket, and their replies come back on it.
/// Frames arrive on the data socket.
#[derive(Debug)]
pub struct UdpTransport {
    command: UdpSocket,
    data: UdpSocket,
    server: SocketAddr,
    multicast: Option<(Ipv4Addr, Ipv4Addr)>,
    buf: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl UdpTransport {
    pub fn open(config: &ClientConfig) -> Result<UdpTransport, TransportError> {
        let command = make_command_socket(config)?;
        let data = make_data_socket(config)?;
        let multicast = match config.connection {
            ConnectionType::Multicast => Some((config.multicast_group, config.local)),
            ConnectionType::Unicast => None,
        };
        debug!(
            server = %config.command_addr(),
            command = ?command.local_addr().ok(),
            data = ?data.local_addr().ok(),
            ?multicast,
            "opened UDP transport"
        );
        Ok(UdpTransport {
            command,
            data,
            server: config.command_addr(),
            multicast,
            buf: Mutex::new(vec![0u8; MAX_PACKET_SIZE]),
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// One attempt at each socket, command socket first.
    fn receive_once(&self, buf: &mut [u8]) -> Result<Option<Bytes>, TransportError> {
        match self.command.recv_from(buf) {
            Ok((n, from)) => {
                trace!(%from, len = n, "command socket");
                return Ok(Some(Bytes::copy_from_slice(&buf[..n])));
            }
            Err(e) if is_timeout(&e) => {}
            // ICMP port unreachable from an earlier send shows up here on some platforms.
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                trace!("ignoring connection reset on command socket");
            }
            Err(e) => return Err(e.into()),
        }
        match self.data.recv_from(buf) {
            Ok((n, from)) => {
                trace!(%from, len = n, "data socket");
                Ok(Some(Bytes::copy_from_slice(&buf[..n])))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.command.send_to(data, self.server)?;
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            if let Some(datagram) = self.receive_once(&mut buf)? {
                return Ok(Some(datagram));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some((group, interface)) = self.multicast {
            if let Err(e) = self.data.leave_multicast_v4(&group, &interface) {
                warn!(%group, error = %e, "failed to leave multicast group");
            }
        }
        debug!("closed UDP transport");
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
