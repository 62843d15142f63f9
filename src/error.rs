// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use std::{
    fmt::{self, Display},
    time::Duration,
};

use thiserror::Error;

use crate::{
    buffer_unbuffer::{BufferUnbufferError, UnbufferResult},
    config::ConfigError,
    data_types::ProtocolVersion,
};

/// The part of a packet being decoded when something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    ServerInfo,
    FrameNumber,
    MarkerSets,
    UnlabeledMarkers,
    RigidBodies,
    Skeletons,
    LabeledMarkers,
    ForcePlates,
    Devices,
    FrameTiming,
    ModelDefinitions,
    Message,
    Response,
    Command,
}

impl Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::ServerInfo => "server info",
            Section::FrameNumber => "frame number",
            Section::MarkerSets => "marker sets",
            Section::UnlabeledMarkers => "unlabeled markers",
            Section::RigidBodies => "rigid bodies",
            Section::Skeletons => "skeletons",
            Section::LabeledMarkers => "labeled markers",
            Section::ForcePlates => "force plates",
            Section::Devices => "devices",
            Section::FrameTiming => "frame timing",
            Section::ModelDefinitions => "model definitions",
            Section::Message => "message string",
            Section::Response => "response",
            Section::Command => "command",
        };
        f.write_str(name)
    }
}

/// Failure to decode one packet. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet truncated: header declares {declared} payload bytes, {available} available")]
    TruncatedPacket { declared: usize, available: usize },
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),
    #[error("malformed {section}: {source}")]
    MalformedSection {
        section: Section,
        #[source]
        source: BufferUnbufferError,
    },
}

/// Attach the section being decoded to a low-level error.
pub(crate) trait SectionContext<T> {
    fn in_section(self, section: Section) -> Result<T, DecodeError>;
}

impl<T> SectionContext<T> for UnbufferResult<T> {
    fn in_section(self, section: Section) -> Result<T, DecodeError> {
        self.map_err(|source| DecodeError::MalformedSection { section, source })
    }
}

/// Failure of the underlying datagram transport. Fatal to a session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
    #[error("peer disconnected")]
    Disconnected,
}

/// Failure to establish a session with a server.
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("no server info received within {0:?}")]
    Timeout(Duration),
    #[error("server info could not be decoded: {0}")]
    Failed(#[source] DecodeError),
    #[error("server speaks NatNet {0}, which is not supported")]
    UnsupportedVersion(ProtocolVersion),
    #[error("could not encode command: {0}")]
    Encode(#[from] BufferUnbufferError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("not connected")]
    NotConnected,
}

/// An operation was called in a state that does not allow it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    #[error("not connected to a server")]
    NotConnected,
}

/// Any error this crate produces.
#[derive(Error, Debug)]
pub enum NatNetError {
    #[error(transparent)]
    Buffer(#[from] BufferUnbufferError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = NatNetError> = std::result::Result<T, E>;
