// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut};

use crate::buffer_unbuffer::{
    buffer_fixed_cstring, check_unbuffer_remaining, constants::MAX_NAME_LENGTH,
    unbuffer_fixed_cstring, BufferResult, BufferTo, UnbufferFrom, UnbufferResult,
};

use super::{
    version::{Features, Rules},
    ProtocolVersion,
};

/// Connection settings a 3.0 or newer server appends to its server info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    /// Ticks per second of the server's high-resolution clock.
    pub clock_frequency: u64,
    pub data_port: u16,
    pub multicast: bool,
    pub multicast_group: Ipv4Addr,
}

const CONNECTION_INFO_SIZE: usize = 8 + 2 + 1 + 4;

/// What a server says about itself in reply to a connect command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerInfo {
    pub app_name: String,
    pub app_version: ProtocolVersion,
    /// The version that governs every layout decision for the session.
    pub natnet_version: ProtocolVersion,
    pub connection: Option<ConnectionInfo>,
}

impl ServerInfo {
    pub fn new(
        app_name: impl Into<String>,
        app_version: ProtocolVersion,
        natnet_version: ProtocolVersion,
    ) -> ServerInfo {
        ServerInfo {
            app_name: app_name.into(),
            app_version,
            natnet_version,
            connection: None,
        }
    }

    /// Clock frequency for converting frame timestamps, when the server sent one.
    pub fn clock_frequency(&self) -> Option<u64> {
        self.connection.map(|c| c.clock_frequency)
    }
}

impl UnbufferFrom for ServerInfo {
    /// The trailer is gated on the version carried in this same packet.
    /// Servers that stop after the version fields still decode, without it.
    fn unbuffer_from<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
        let app_name = unbuffer_fixed_cstring(buf, MAX_NAME_LENGTH)?;
        let app_version = ProtocolVersion::unbuffer_from(buf)?;
        let natnet_version = ProtocolVersion::unbuffer_from(buf)?;
        let rules = Rules::new(natnet_version);
        let connection = if rules.has(Features::SERVER_CONNECTION_INFO) && buf.has_remaining() {
            check_unbuffer_remaining(buf, CONNECTION_INFO_SIZE)?;
            let clock_frequency = u64::unbuffer_from(buf)?;
            let data_port = u16::unbuffer_from(buf)?;
            let multicast = u8::unbuffer_from(buf)? != 0;
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            Some(ConnectionInfo {
                clock_frequency,
                data_port,
                multicast,
                multicast_group: Ipv4Addr::from(octets),
            })
        } else {
            None
        };
        Ok(ServerInfo {
            app_name,
            app_version,
            natnet_version,
            connection,
        })
    }
}

impl ServerInfo {
    pub(crate) fn encode<T: BufMut>(&self, buf: &mut T) -> BufferResult {
        buffer_fixed_cstring(buf, &self.app_name, MAX_NAME_LENGTH)?;
        self.app_version.buffer_to(buf)?;
        self.natnet_version.buffer_to(buf)?;
        let rules = Rules::new(self.natnet_version);
        if let Some(connection) = self
            .connection
            .filter(|_| rules.has(Features::SERVER_CONNECTION_INFO))
        {
            connection.clock_frequency.buffer_to(buf)?;
            connection.data_port.buffer_to(buf)?;
            u8::from(connection.multicast).buffer_to(buf)?;
            buf.put_slice(&connection.multicast_group.octets());
        }
        Ok(())
    }
}
