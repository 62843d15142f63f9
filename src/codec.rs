// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Packet framing: the header every datagram starts with, the packets a
//! server sends, and the commands a client sends.

use std::convert::TryFrom;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    buffer_unbuffer::{
        buffer_cstring, constants::HEADER_LEN, unbuffer_cstring, BufferResult, BufferTo,
        BufferUnbufferError, ConstantBufferSize, UnbufferConstantSize, UnbufferFrom,
        UnbufferResult,
    },
    data_types::{
        buffer_model_definitions, constants, unbuffer_model_definitions, DataFrame, MessageId,
        ModelDescription, ProtocolVersion, Rules, ServerInfo,
    },
    error::{DecodeError, Section, SectionContext},
};

/// Message id and payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub message_id: MessageId,
    pub payload_len: u16,
}

impl ConstantBufferSize for PacketHeader {
    fn constant_buffer_size() -> usize {
        HEADER_LEN
    }
}

impl BufferTo for PacketHeader {
    fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult {
        self.message_id.buffer_to(buf)?;
        self.payload_len.buffer_to(buf)
    }
}

impl UnbufferConstantSize for PacketHeader {
    fn unbuffer_constant_size<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
        Ok(PacketHeader {
            message_id: MessageId::unbuffer_constant_size(buf)?,
            payload_len: u16::unbuffer_constant_size(buf)?,
        })
    }
}

/// Split a datagram into its header and the payload the header declares.
///
/// Bytes past the declared payload are dropped.
pub fn split_packet(data: &[u8]) -> Result<(PacketHeader, &[u8]), DecodeError> {
    let mut buf = data;
    let header = PacketHeader::unbuffer_from(&mut buf).map_err(|_| DecodeError::TruncatedPacket {
        declared: HEADER_LEN,
        available: data.len(),
    })?;
    let declared = usize::from(header.payload_len);
    if declared > buf.len() {
        return Err(DecodeError::TruncatedPacket {
            declared,
            available: buf.len(),
        });
    }
    Ok((header, &buf[..declared]))
}

fn frame<F>(message_id: MessageId, write_payload: F) -> Result<Bytes, BufferUnbufferError>
where
    F: FnOnce(&mut BytesMut) -> BufferResult,
{
    let mut payload = BytesMut::new();
    write_payload(&mut payload)?;
    let payload_len = u16::try_from(payload.len())
        .map_err(|_| BufferUnbufferError::PayloadTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    PacketHeader {
        message_id,
        payload_len,
    }
    .buffer_to(&mut buf)?;
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Reply to a request command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Response {
    /// A payload of exactly four bytes is a numeric result.
    Code(i32),
    Text(String),
}

/// Everything a server can send to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    ServerInfo(ServerInfo),
    DataFrame(DataFrame),
    ModelDefinitions(Vec<ModelDescription>),
    Message(String),
    Response(Response),
    UnrecognizedRequest,
}

impl Packet {
    pub fn message_id(&self) -> MessageId {
        match self {
            Packet::ServerInfo(_) => constants::SERVER_INFO,
            Packet::DataFrame(_) => constants::FRAME_OF_DATA,
            Packet::ModelDefinitions(_) => constants::MODEL_DEFINITIONS,
            Packet::Message(_) => constants::MESSAGE_STRING,
            Packet::Response(_) => constants::RESPONSE,
            Packet::UnrecognizedRequest => constants::UNRECOGNIZED_REQUEST,
        }
    }
}

/// Decodes server packets with the layout of one negotiated version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDecoder {
    rules: Rules,
    clock_frequency: Option<u64>,
}

impl PacketDecoder {
    pub fn new(version: ProtocolVersion) -> PacketDecoder {
        PacketDecoder {
            rules: Rules::new(version),
            clock_frequency: None,
        }
    }

    /// A decoder for a server, stamping its clock frequency into every frame.
    pub fn for_server(info: &ServerInfo) -> PacketDecoder {
        PacketDecoder {
            rules: Rules::new(info.natnet_version),
            clock_frequency: info.clock_frequency(),
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn version(&self) -> ProtocolVersion {
        self.rules.version()
    }

    /// Decode one datagram into exactly one packet.
    pub fn decode(&self, data: &[u8]) -> Result<Packet, DecodeError> {
        let (header, mut payload) = split_packet(data)?;
        let packet = match header.message_id {
            constants::CONNECT | constants::SERVER_INFO => Packet::ServerInfo(
                ServerInfo::unbuffer_from(&mut payload).in_section(Section::ServerInfo)?,
            ),
            constants::FRAME_OF_DATA => {
                let mut frame = DataFrame::decode(&mut payload, &self.rules)?;
                frame.time_info.clock_frequency = self.clock_frequency;
                Packet::DataFrame(frame)
            }
            constants::MODEL_DEFINITIONS => Packet::ModelDefinitions(
                unbuffer_model_definitions(&mut payload, &self.rules)
                    .in_section(Section::ModelDefinitions)?,
            ),
            constants::MESSAGE_STRING => Packet::Message(
                unbuffer_cstring(&mut payload).in_section(Section::Message)?,
            ),
            constants::RESPONSE => {
                Packet::Response(unbuffer_response(&mut payload).in_section(Section::Response)?)
            }
            constants::UNRECOGNIZED_REQUEST | constants::UNRECOGNIZED_REQUEST_LEGACY => {
                Packet::UnrecognizedRequest
            }
            MessageId(other) => return Err(DecodeError::UnknownMessageType(other)),
        };
        Ok(packet)
    }
}

fn unbuffer_response(payload: &mut &[u8]) -> UnbufferResult<Response> {
    if payload.len() == i32::constant_buffer_size() {
        Ok(Response::Code(i32::unbuffer_from(payload)?))
    } else {
        Ok(Response::Text(unbuffer_cstring(payload)?))
    }
}

/// Decode a datagram if it is a server info packet, independent of any version.
///
/// Returns `Ok(None)` for a well-framed packet of any other type.
pub fn decode_server_info(data: &[u8]) -> Result<Option<ServerInfo>, DecodeError> {
    let (header, mut payload) = split_packet(data)?;
    match header.message_id {
        constants::CONNECT | constants::SERVER_INFO => {
            ServerInfo::unbuffer_from(&mut payload)
                .in_section(Section::ServerInfo)
                .map(Some)
        }
        _ => Ok(None),
    }
}

/// Encode a server packet in the layout of the given version.
pub fn encode_packet(packet: &Packet, rules: &Rules) -> Result<Bytes, BufferUnbufferError> {
    frame(packet.message_id(), |buf| match packet {
        Packet::ServerInfo(info) => info.encode(buf),
        Packet::DataFrame(data) => data.encode(buf, rules),
        Packet::ModelDefinitions(descriptions) => {
            buffer_model_definitions(buf, descriptions, rules)
        }
        Packet::Message(text) => buffer_cstring(buf, text),
        Packet::Response(Response::Code(code)) => code.buffer_to(buf),
        Packet::Response(Response::Text(text)) => {
            buffer_cstring(buf, text)?;
            if buf.len() == i32::constant_buffer_size() {
                // Would read back as a code.
                buf.put_u8(0);
            }
            Ok(())
        }
        Packet::UnrecognizedRequest => Ok(()),
    })
}

/// Everything a client can send to a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Also asks the server to identify itself.
    Connect,
    /// A free-form request string, such as `"StartRecording"`.
    Request(String),
    RequestModelDefinitions,
    RequestFrameOfData,
    Disconnect,
    KeepAlive,
}

impl Command {
    pub fn message_id(&self) -> MessageId {
        match self {
            Command::Connect => constants::CONNECT,
            Command::Request(_) => constants::REQUEST,
            Command::RequestModelDefinitions => constants::REQUEST_MODEL_DEFINITIONS,
            Command::RequestFrameOfData => constants::REQUEST_FRAME_OF_DATA,
            Command::Disconnect => constants::DISCONNECT,
            Command::KeepAlive => constants::KEEP_ALIVE,
        }
    }

    /// Encode as a datagram.
    ///
    /// Commands without a payload declare a length of zero but are still
    /// followed by a single null byte, as servers expect.
    pub fn to_bytes(&self) -> Result<Bytes, BufferUnbufferError> {
        match self {
            Command::Connect => frame(self.message_id(), |buf| {
                buf.put_slice(constants::CONNECT_PAYLOAD);
                Ok(())
            }),
            Command::Request(text) => frame(self.message_id(), |buf| buffer_cstring(buf, text)),
            _ => {
                let mut buf = BytesMut::from(&frame(self.message_id(), |_| Ok(()))?[..]);
                buf.put_u8(0);
                Ok(buf.freeze())
            }
        }
    }

    /// Decode a datagram sent by a client.
    pub fn decode(data: &[u8]) -> Result<Command, DecodeError> {
        let (header, mut payload) = split_packet(data)?;
        let command = match header.message_id {
            constants::CONNECT => Command::Connect,
            constants::REQUEST => {
                Command::Request(unbuffer_cstring(&mut payload).in_section(Section::Command)?)
            }
            constants::REQUEST_MODEL_DEFINITIONS => Command::RequestModelDefinitions,
            constants::REQUEST_FRAME_OF_DATA => Command::RequestFrameOfData,
            constants::DISCONNECT => Command::Disconnect,
            constants::KEEP_ALIVE => Command::KeepAlive,
            MessageId(other) => return Err(DecodeError::UnknownMessageType(other)),
        };
        Ok(command)
    }
}
