// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Finding out which protocol version a server speaks.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::{
    codec::{decode_server_info, Command, PacketDecoder},
    data_types::ServerInfo,
    error::{DecodeError, NegotiationError, Section},
    transport::Transport,
};

/// The outcome of a successful negotiation: who the server is, and how to
/// read everything it sends from now on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub server_info: ServerInfo,
    pub decoder: PacketDecoder,
}

/// Runs the connect/server-info exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionNegotiator;

impl VersionNegotiator {
    /// Ping the server and build a decoder for the version it answers with.
    pub fn negotiate(
        transport: &dyn Transport,
        timeout: Duration,
    ) -> Result<Session, NegotiationError> {
        let server_info = VersionNegotiator::query(transport, timeout)?;
        if !server_info.natnet_version.is_supported() {
            return Err(NegotiationError::UnsupportedVersion(
                server_info.natnet_version,
            ));
        }
        info!(
            app = %server_info.app_name,
            app_version = %server_info.app_version,
            natnet_version = %server_info.natnet_version,
            "negotiated"
        );
        Ok(Session {
            decoder: PacketDecoder::for_server(&server_info),
            server_info,
        })
    }

    /// Ping the server and wait for its server info, without judging the version.
    pub fn query(
        transport: &dyn Transport,
        timeout: Duration,
    ) -> Result<ServerInfo, NegotiationError> {
        transport.send(&Command::Connect.to_bytes()?)?;
        debug!(?timeout, "sent connect");
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::from_secs(0) {
                return Err(NegotiationError::Timeout(timeout));
            }
            let data = match transport.receive(remaining)? {
                Some(data) => data,
                None => continue,
            };
            match decode_server_info(&data) {
                Ok(Some(server_info)) => return Ok(server_info),
                Ok(None) => trace!(len = data.len(), "skipping packet while negotiating"),
                Err(e @ DecodeError::MalformedSection {
                    section: Section::ServerInfo,
                    ..
                }) => return Err(NegotiationError::Failed(e)),
                Err(e) => trace!(error = %e, "skipping undecodable packet while negotiating"),
            }
        }
    }
}
