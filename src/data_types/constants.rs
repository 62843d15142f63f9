// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Constants from the NatNet protocol.
//!
//! Constants in this file must remain unchanged so that they match what servers send.

use std::net::Ipv4Addr;

use super::MessageId;

pub const CONNECT: MessageId = MessageId(0);
pub const SERVER_INFO: MessageId = MessageId(1);
pub const REQUEST: MessageId = MessageId(2);
pub const RESPONSE: MessageId = MessageId(3);
pub const REQUEST_MODEL_DEFINITIONS: MessageId = MessageId(4);
pub const MODEL_DEFINITIONS: MessageId = MessageId(5);
pub const REQUEST_FRAME_OF_DATA: MessageId = MessageId(6);
pub const FRAME_OF_DATA: MessageId = MessageId(7);
pub const MESSAGE_STRING: MessageId = MessageId(8);
pub const DISCONNECT: MessageId = MessageId(9);
pub const KEEP_ALIVE: MessageId = MessageId(10);
pub const UNRECOGNIZED_REQUEST: MessageId = MessageId(100);
/// Some servers send the unrecognized-request id as hex 100.
pub const UNRECOGNIZED_REQUEST_LEGACY: MessageId = MessageId(0x100);

/// Payload of the connect command.
pub const CONNECT_PAYLOAD: &[u8] = b"Ping\0";

pub const DESCRIPTION_MARKER_SET: i32 = 0;
pub const DESCRIPTION_RIGID_BODY: i32 = 1;
pub const DESCRIPTION_SKELETON: i32 = 2;
pub const DESCRIPTION_FORCE_PLATE: i32 = 3;
pub const DESCRIPTION_DEVICE: i32 = 4;

pub const DEFAULT_COMMAND_PORT: u16 = 1510;
pub const DEFAULT_DATA_PORT: u16 = 1511;
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// Force plate calibration matrices are always this many rows and columns.
pub const CALIBRATION_MATRIX_SIZE: usize = 12;
/// Number of corners in a force plate description.
pub const FORCE_PLATE_CORNERS: usize = 4;
