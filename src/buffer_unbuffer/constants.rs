// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Constants that do not involve NatNet-specific data types.
//!
//! Constants in this file must remain unchanged so that they match the server implementation.

/// Size of the message id plus the payload length that start every packet.
pub const HEADER_LEN: usize = 4;

/// Width of the fixed, null-padded application name in a server info packet.
pub const MAX_NAME_LENGTH: usize = 256;

/// Largest datagram the UDP transport will accept.
pub const MAX_PACKET_SIZE: usize = 65503;

/// Receive buffer size used unless configured otherwise (32 KiB).
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 32768;
