// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! A client for NatNet, the protocol motion-capture servers such as Motive
//! use to stream tracking data.
//!
//! Connect with a [`MotionClient`], which negotiates the protocol version and
//! then decodes each streamed packet on a background thread and hands it to
//! your [`MotionListener`].

extern crate bytes;
extern crate cgmath;
extern crate chrono;
extern crate url;

#[macro_use]
extern crate bitflags;

#[cfg(test)]
#[macro_use]
extern crate hex_literal;

pub mod buffer_unbuffer;
pub mod client;
pub mod codec;
pub mod config;
pub mod data_types;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod negotiation;
pub mod transport;

pub use crate::{
    client::MotionClient,
    codec::{Command, Packet, PacketDecoder, Response},
    config::{ClientConfig, ConfigError, ConnectionType},
    data_types::{
        AnalogDevice, ConnectionInfo, DataFrame, FrameFlags, Marker, MarkerFlags, MarkerSet,
        ModelDescription, ProtocolVersion, Quat, RigidBody, Rules, ServerInfo, Skeleton,
        TimeInfo, Timecode, Vec3,
    },
    dispatcher::{SessionState, StreamDispatcher},
    error::{DecodeError, NatNetError, NegotiationError, Result, Section, TransportError, UsageError},
    listener::{FrameInfo, MotionListener, NullListener},
    negotiation::{Session, VersionNegotiator},
    transport::{Transport, UdpTransport},
};
