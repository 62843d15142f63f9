// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! The frame-of-data packet.

use bytes::{Buf, BufMut};

use crate::{
    buffer_unbuffer::{
        buffer_list, unbuffer_list, BufferResult, BufferTo, ConstantBufferSize, UnbufferFrom,
        UnbufferResult,
    },
    error::{DecodeError, Section, SectionContext},
};

use super::{
    analog::ANALOG_DEVICE_MIN_SIZE,
    marker::{LABELED_MARKER_MIN_SIZE, MARKER_SET_MIN_SIZE},
    rigid_body::{buffer_rigid_bodies, check_unique_ids, unbuffer_rigid_bodies, SKELETON_MIN_SIZE},
    version::{BufferVersioned, Features, Rules, UnbufferVersioned},
    AnalogDevice, Marker, MarkerSet, RigidBody, Skeleton, TimeInfo, Timecode, Vec3,
};

bitflags! {
    /// Frame-level status bits.
    pub struct FrameFlags: u16 {
        const RECORDING = 0x01;
        const TRACKED_MODELS_CHANGED = 0x02;
    }
}

impl Default for FrameFlags {
    fn default() -> Self {
        FrameFlags::empty()
    }
}

/// One frame of motion capture data.
///
/// Sections a version does not carry are left empty (or `None`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    pub frame_number: i32,
    pub marker_sets: Vec<MarkerSet>,
    pub unlabeled_markers: Vec<Marker>,
    pub rigid_bodies: Vec<RigidBody>,
    pub skeletons: Vec<Skeleton>,
    pub labeled_markers: Vec<Marker>,
    pub force_plates: Vec<AnalogDevice>,
    pub devices: Vec<AnalogDevice>,
    /// Software latency in seconds, only sent before 3.0.
    pub latency: Option<f32>,
    pub timecode: Timecode,
    pub time_info: TimeInfo,
    pub flags: FrameFlags,
}

impl DataFrame {
    pub fn is_recording(&self) -> bool {
        self.flags.contains(FrameFlags::RECORDING)
    }

    pub fn tracked_models_changed(&self) -> bool {
        self.flags.contains(FrameFlags::TRACKED_MODELS_CHANGED)
    }

    /// Decode a frame-of-data payload.
    ///
    /// Anything after the frame parameters is ignored.
    pub fn decode<T: Buf>(buf: &mut T, rules: &Rules) -> Result<DataFrame, DecodeError> {
        let frame_number = i32::unbuffer_from(buf).in_section(Section::FrameNumber)?;

        let marker_sets =
            unbuffer_list(buf, MARKER_SET_MIN_SIZE, MarkerSet::unbuffer_from)
                .in_section(Section::MarkerSets)?;

        let unlabeled_markers = unbuffer_list(buf, Vec3::constant_buffer_size(), |buf| {
            Vec3::unbuffer_from(buf).map(Marker::unlabeled)
        })
        .in_section(Section::UnlabeledMarkers)?;

        let rigid_bodies = unbuffer_rigid_bodies(buf, rules).in_section(Section::RigidBodies)?;

        let skeletons = if rules.has(Features::SKELETONS) {
            unbuffer_skeletons(buf, rules).in_section(Section::Skeletons)?
        } else {
            Vec::new()
        };

        let labeled_markers = if rules.has(Features::LABELED_MARKERS) {
            unbuffer_list(buf, LABELED_MARKER_MIN_SIZE, |buf| {
                Marker::unbuffer_versioned(buf, rules)
            })
            .in_section(Section::LabeledMarkers)?
        } else {
            Vec::new()
        };

        let force_plates = if rules.has(Features::FORCE_PLATES) {
            unbuffer_list(buf, ANALOG_DEVICE_MIN_SIZE, AnalogDevice::unbuffer_from)
                .in_section(Section::ForcePlates)?
        } else {
            Vec::new()
        };

        let devices = if rules.has(Features::DEVICES) {
            unbuffer_list(buf, ANALOG_DEVICE_MIN_SIZE, AnalogDevice::unbuffer_from)
                .in_section(Section::Devices)?
        } else {
            Vec::new()
        };

        let (latency, timecode, time_info, flags) =
            unbuffer_timing(buf, rules).in_section(Section::FrameTiming)?;

        Ok(DataFrame {
            frame_number,
            marker_sets,
            unlabeled_markers,
            rigid_bodies,
            skeletons,
            labeled_markers,
            force_plates,
            devices,
            latency,
            timecode,
            time_info,
            flags,
        })
    }

    /// Encode as a frame-of-data payload, omitting whatever the version does not carry.
    pub fn encode<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult {
        self.frame_number.buffer_to(buf)?;
        buffer_list(buf, &self.marker_sets, |set, buf| set.buffer_to(buf))?;
        buffer_list(buf, &self.unlabeled_markers, |m, buf| {
            m.position.buffer_to(buf)
        })?;
        buffer_rigid_bodies(buf, &self.rigid_bodies, rules)?;
        if rules.has(Features::SKELETONS) {
            buffer_list(buf, &self.skeletons, |s, buf| s.buffer_versioned(buf, rules))?;
        }
        if rules.has(Features::LABELED_MARKERS) {
            buffer_list(buf, &self.labeled_markers, |m, buf| {
                m.buffer_versioned(buf, rules)
            })?;
        }
        if rules.has(Features::FORCE_PLATES) {
            buffer_list(buf, &self.force_plates, |p, buf| p.buffer_to(buf))?;
        }
        if rules.has(Features::DEVICES) {
            buffer_list(buf, &self.devices, |d, buf| d.buffer_to(buf))?;
        }
        if rules.has(Features::SOFTWARE_LATENCY) {
            self.latency.unwrap_or_default().buffer_to(buf)?;
        }
        self.timecode.timecode.buffer_to(buf)?;
        self.timecode.subframe.buffer_to(buf)?;
        if rules.has(Features::DOUBLE_TIMESTAMP) {
            self.time_info.timestamp.buffer_to(buf)?;
        } else {
            (self.time_info.timestamp as f32).buffer_to(buf)?;
        }
        if rules.has(Features::HIGH_RES_TIMESTAMPS) {
            self.time_info
                .camera_mid_exposure
                .unwrap_or_default()
                .buffer_to(buf)?;
            self.time_info
                .camera_data_received
                .unwrap_or_default()
                .buffer_to(buf)?;
            self.time_info.transmit.unwrap_or_default().buffer_to(buf)?;
        }
        (self.flags.bits() as i16).buffer_to(buf)
    }
}

fn unbuffer_skeletons<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Vec<Skeleton>> {
    let skeletons = unbuffer_list(buf, SKELETON_MIN_SIZE, |buf| {
        Skeleton::unbuffer_versioned(buf, rules)
    })?;
    check_unique_ids(skeletons.iter().map(|s| s.id))?;
    Ok(skeletons)
}

fn unbuffer_timing<T: Buf>(
    buf: &mut T,
    rules: &Rules,
) -> UnbufferResult<(Option<f32>, Timecode, TimeInfo, FrameFlags)> {
    let latency = if rules.has(Features::SOFTWARE_LATENCY) {
        Some(f32::unbuffer_from(buf)?)
    } else {
        None
    };
    let timecode = Timecode::new(u32::unbuffer_from(buf)?, u32::unbuffer_from(buf)?);
    let timestamp = if rules.has(Features::DOUBLE_TIMESTAMP) {
        f64::unbuffer_from(buf)?
    } else {
        f64::from(f32::unbuffer_from(buf)?)
    };
    let mut time_info = TimeInfo {
        timestamp,
        ..Default::default()
    };
    if rules.has(Features::HIGH_RES_TIMESTAMPS) {
        time_info.camera_mid_exposure = Some(u64::unbuffer_from(buf)?);
        time_info.camera_data_received = Some(u64::unbuffer_from(buf)?);
        time_info.transmit = Some(u64::unbuffer_from(buf)?);
    }
    let flags = FrameFlags::from_bits_truncate(i16::unbuffer_from(buf)? as u16);
    Ok((latency, timecode, time_info, flags))
}
