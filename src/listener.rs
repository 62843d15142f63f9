// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! What a client application implements to receive decoded data.

use tracing::debug;

use crate::{
    codec::{Packet, Response},
    data_types::{
        AnalogDevice, DataFrame, FrameFlags, Marker, MarkerSet, ModelDescription, RigidBody,
        ServerInfo, Skeleton, TimeInfo, Timecode,
    },
    error::{DecodeError, TransportError},
};

/// The per-frame fields that are not a list of tracked things.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub frame_number: i32,
    pub timecode: Timecode,
    pub time_info: TimeInfo,
    pub latency: Option<f32>,
    pub flags: FrameFlags,
}

impl FrameInfo {
    pub fn from_frame(frame: &DataFrame) -> FrameInfo {
        FrameInfo {
            frame_number: frame.frame_number,
            timecode: frame.timecode,
            time_info: frame.time_info,
            latency: frame.latency,
            flags: frame.flags,
        }
    }
}

/// Callbacks for everything a server streams.
///
/// Every method has a no-op default, so implement only what you need.
/// All calls for one session happen in arrival order on a single
/// background thread, so implementations need not be reentrant.
///
/// For each data frame, `on_frame_info` comes first, followed by one call
/// per section (even an empty one) in this order: marker sets, rigid
/// bodies, skeletons, labeled markers, unlabeled markers, force plates,
/// devices.
#[allow(unused_variables)]
pub trait MotionListener: Send {
    /// The server identified itself. Always the first callback of a stream.
    fn on_version(&mut self, server_info: &ServerInfo) {}

    fn on_frame_info(&mut self, frame_info: &FrameInfo) {}

    fn on_marker_sets(&mut self, marker_sets: &[MarkerSet], time_info: &TimeInfo) {}

    fn on_rigid_bodies(&mut self, rigid_bodies: &[RigidBody], time_info: &TimeInfo) {}

    fn on_skeletons(&mut self, skeletons: &[Skeleton], time_info: &TimeInfo) {}

    fn on_labeled_markers(&mut self, markers: &[Marker], time_info: &TimeInfo) {}

    fn on_unlabeled_markers(&mut self, markers: &[Marker], time_info: &TimeInfo) {}

    fn on_force_plates(&mut self, force_plates: &[AnalogDevice], time_info: &TimeInfo) {}

    fn on_devices(&mut self, devices: &[AnalogDevice], time_info: &TimeInfo) {}

    /// Reply to `request_model_definitions`.
    fn on_model_definitions(&mut self, descriptions: &[ModelDescription]) {}

    /// A free-form message from the server.
    fn on_message(&mut self, message: &str) {}

    /// Reply to a command sent with `send_command`.
    fn on_response(&mut self, response: &Response) {}

    /// A packet could not be decoded. The stream continues.
    fn on_decode_error(&mut self, error: &DecodeError) {}

    /// The stream ended. `error` is `None` when the client asked for it.
    fn on_disconnect(&mut self, error: Option<&TransportError>) {}
}

/// A listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl MotionListener for NullListener {}

impl<L: MotionListener + ?Sized> MotionListener for Box<L> {
    fn on_version(&mut self, server_info: &ServerInfo) {
        (**self).on_version(server_info)
    }
    fn on_frame_info(&mut self, frame_info: &FrameInfo) {
        (**self).on_frame_info(frame_info)
    }
    fn on_marker_sets(&mut self, marker_sets: &[MarkerSet], time_info: &TimeInfo) {
        (**self).on_marker_sets(marker_sets, time_info)
    }
    fn on_rigid_bodies(&mut self, rigid_bodies: &[RigidBody], time_info: &TimeInfo) {
        (**self).on_rigid_bodies(rigid_bodies, time_info)
    }
    fn on_skeletons(&mut self, skeletons: &[Skeleton], time_info: &TimeInfo) {
        (**self).on_skeletons(skeletons, time_info)
    }
    fn on_labeled_markers(&mut self, markers: &[Marker], time_info: &TimeInfo) {
        (**self).on_labeled_markers(markers, time_info)
    }
    fn on_unlabeled_markers(&mut self, markers: &[Marker], time_info: &TimeInfo) {
        (**self).on_unlabeled_markers(markers, time_info)
    }
    fn on_force_plates(&mut self, force_plates: &[AnalogDevice], time_info: &TimeInfo) {
        (**self).on_force_plates(force_plates, time_info)
    }
    fn on_devices(&mut self, devices: &[AnalogDevice], time_info: &TimeInfo) {
        (**self).on_devices(devices, time_info)
    }
    fn on_model_definitions(&mut self, descriptions: &[ModelDescription]) {
        (**self).on_model_definitions(descriptions)
    }
    fn on_message(&mut self, message: &str) {
        (**self).on_message(message)
    }
    fn on_response(&mut self, response: &Response) {
        (**self).on_response(response)
    }
    fn on_decode_error(&mut self, error: &DecodeError) {
        (**self).on_decode_error(error)
    }
    fn on_disconnect(&mut self, error: Option<&TransportError>) {
        (**self).on_disconnect(error)
    }
}

/// Hand one decoded packet to the matching callbacks.
pub fn dispatch_packet(listener: &mut dyn MotionListener, packet: &Packet) {
    match packet {
        Packet::ServerInfo(server_info) => listener.on_version(server_info),
        Packet::DataFrame(frame) => dispatch_frame(listener, frame),
        Packet::ModelDefinitions(descriptions) => listener.on_model_definitions(descriptions),
        Packet::Message(message) => listener.on_message(message),
        Packet::Response(response) => listener.on_response(response),
        Packet::UnrecognizedRequest => debug!("server did not recognize a request"),
    }
}

fn dispatch_frame(listener: &mut dyn MotionListener, frame: &DataFrame) {
    let time_info = &frame.time_info;
    listener.on_frame_info(&FrameInfo::from_frame(frame));
    listener.on_marker_sets(&frame.marker_sets, time_info);
    listener.on_rigid_bodies(&frame.rigid_bodies, time_info);
    listener.on_skeletons(&frame.skeletons, time_info);
    listener.on_labeled_markers(&frame.labeled_markers, time_info);
    listener.on_unlabeled_markers(&frame.unlabeled_markers, time_info);
    listener.on_force_plates(&frame.force_plates, time_info);
    listener.on_devices(&frame.devices, time_info);
}
