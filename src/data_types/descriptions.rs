// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Model definitions: the static description of what a server tracks.

use bytes::{Buf, BufMut};

use crate::buffer_unbuffer::{
    buffer_count, buffer_cstring, buffer_list, unbuffer_count, unbuffer_cstring, unbuffer_list,
    BufferResult, BufferTo, BufferUnbufferError, ConstantBufferSize, UnbufferFrom, UnbufferResult,
};

use super::{
    constants::{
        CALIBRATION_MATRIX_SIZE, DESCRIPTION_DEVICE, DESCRIPTION_FORCE_PLATE,
        DESCRIPTION_MARKER_SET, DESCRIPTION_RIGID_BODY, DESCRIPTION_SKELETON, FORCE_PLATE_CORNERS,
    },
    version::{BufferVersioned, Features, Rules, UnbufferVersioned},
    Vec3,
};

/// Smallest possible string: just the terminator.
const STRING_MIN_SIZE: usize = 1;

fn unbuffer_names<T: Buf>(buf: &mut T) -> UnbufferResult<Vec<String>> {
    unbuffer_list(buf, STRING_MIN_SIZE, unbuffer_cstring)
}

fn buffer_names<T: BufMut>(buf: &mut T, names: &[String]) -> BufferResult {
    buffer_list(buf, names, |name, buf| buffer_cstring(buf, name))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkerSetDescription {
    pub name: String,
    pub marker_names: Vec<String>,
}

/// A marker belonging to a rigid body, described relative to the body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RigidBodyMarkerDescription {
    pub offset: Vec3,
    pub active_label: i32,
    /// Sent from 4.0 onwards, empty before.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RigidBodyDescription {
    pub name: String,
    pub id: i32,
    /// Id of the parent body, or -1.
    pub parent_id: i32,
    /// Offset from the parent body.
    pub offset: Vec3,
    /// Sent from 3.0 onwards.
    pub markers: Vec<RigidBodyMarkerDescription>,
}

impl UnbufferVersioned for RigidBodyDescription {
    fn unbuffer_versioned<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Self> {
        let name = unbuffer_cstring(buf)?;
        let id = i32::unbuffer_from(buf)?;
        let parent_id = i32::unbuffer_from(buf)?;
        let offset = Vec3::unbuffer_from(buf)?;
        let mut markers = Vec::new();
        if rules.has(Features::RIGID_BODY_DESCRIPTION_MARKERS) {
            let count = unbuffer_count(buf, Vec3::constant_buffer_size() + 4)?;
            markers = (0..count)
                .map(|_| {
                    Vec3::unbuffer_from(buf).map(|offset| RigidBodyMarkerDescription {
                        offset,
                        ..Default::default()
                    })
                })
                .collect::<UnbufferResult<Vec<_>>>()?;
            for marker in &mut markers {
                marker.active_label = i32::unbuffer_from(buf)?;
            }
            if rules.has(Features::RIGID_BODY_DESCRIPTION_MARKER_NAMES) {
                for marker in &mut markers {
                    marker.name = unbuffer_cstring(buf)?;
                }
            }
        }
        Ok(RigidBodyDescription {
            name,
            id,
            parent_id,
            offset,
            markers,
        })
    }
}

impl BufferVersioned for RigidBodyDescription {
    fn buffer_versioned<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult {
        buffer_cstring(buf, &self.name)?;
        self.id.buffer_to(buf)?;
        self.parent_id.buffer_to(buf)?;
        self.offset.buffer_to(buf)?;
        if rules.has(Features::RIGID_BODY_DESCRIPTION_MARKERS) {
            buffer_count(buf, self.markers.len())?;
            for marker in &self.markers {
                marker.offset.buffer_to(buf)?;
            }
            for marker in &self.markers {
                marker.active_label.buffer_to(buf)?;
            }
            if rules.has(Features::RIGID_BODY_DESCRIPTION_MARKER_NAMES) {
                for marker in &self.markers {
                    buffer_cstring(buf, &marker.name)?;
                }
            }
        }
        Ok(())
    }
}

/// Smallest possible rigid body description: empty name, ids, offset.
const RIGID_BODY_DESCRIPTION_MIN_SIZE: usize = 1 + 4 + 4 + 12;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkeletonDescription {
    pub name: String,
    pub id: i32,
    pub bones: Vec<RigidBodyDescription>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForcePlateDescription {
    pub id: i32,
    pub serial: String,
    pub width: f32,
    pub length: f32,
    pub origin: Vec3,
    pub calibration: [[f32; CALIBRATION_MATRIX_SIZE]; CALIBRATION_MATRIX_SIZE],
    pub corners: [Vec3; FORCE_PLATE_CORNERS],
    pub plate_type: i32,
    pub channel_data_type: i32,
    pub channel_names: Vec<String>,
}

impl UnbufferFrom for ForcePlateDescription {
    fn unbuffer_from<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
        let id = i32::unbuffer_from(buf)?;
        let serial = unbuffer_cstring(buf)?;
        let width = f32::unbuffer_from(buf)?;
        let length = f32::unbuffer_from(buf)?;
        let origin = Vec3::unbuffer_from(buf)?;
        let mut calibration = [[0.0; CALIBRATION_MATRIX_SIZE]; CALIBRATION_MATRIX_SIZE];
        for row in calibration.iter_mut() {
            for value in row.iter_mut() {
                *value = f32::unbuffer_from(buf)?;
            }
        }
        let mut corners = [Vec3::default(); FORCE_PLATE_CORNERS];
        for corner in corners.iter_mut() {
            *corner = Vec3::unbuffer_from(buf)?;
        }
        let plate_type = i32::unbuffer_from(buf)?;
        let channel_data_type = i32::unbuffer_from(buf)?;
        let channel_names = unbuffer_names(buf)?;
        Ok(ForcePlateDescription {
            id,
            serial,
            width,
            length,
            origin,
            calibration,
            corners,
            plate_type,
            channel_data_type,
            channel_names,
        })
    }
}

impl ForcePlateDescription {
    fn encode<T: BufMut>(&self, buf: &mut T) -> BufferResult {
        self.id.buffer_to(buf)?;
        buffer_cstring(buf, &self.serial)?;
        self.width.buffer_to(buf)?;
        self.length.buffer_to(buf)?;
        self.origin.buffer_to(buf)?;
        for value in self.calibration.iter().flatten() {
            value.buffer_to(buf)?;
        }
        for corner in &self.corners {
            corner.buffer_to(buf)?;
        }
        self.plate_type.buffer_to(buf)?;
        self.channel_data_type.buffer_to(buf)?;
        buffer_names(buf, &self.channel_names)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescription {
    pub id: i32,
    pub name: String,
    pub serial: String,
    pub device_type: i32,
    pub channel_data_type: i32,
    pub channel_names: Vec<String>,
}

/// One entry of a model definitions packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDescription {
    MarkerSet(MarkerSetDescription),
    RigidBody(RigidBodyDescription),
    Skeleton(SkeletonDescription),
    ForcePlate(ForcePlateDescription),
    Device(DeviceDescription),
}

impl ModelDescription {
    pub fn name(&self) -> &str {
        match self {
            ModelDescription::MarkerSet(d) => &d.name,
            ModelDescription::RigidBody(d) => &d.name,
            ModelDescription::Skeleton(d) => &d.name,
            ModelDescription::ForcePlate(d) => &d.serial,
            ModelDescription::Device(d) => &d.name,
        }
    }

    fn type_id(&self) -> i32 {
        match self {
            ModelDescription::MarkerSet(_) => DESCRIPTION_MARKER_SET,
            ModelDescription::RigidBody(_) => DESCRIPTION_RIGID_BODY,
            ModelDescription::Skeleton(_) => DESCRIPTION_SKELETON,
            ModelDescription::ForcePlate(_) => DESCRIPTION_FORCE_PLATE,
            ModelDescription::Device(_) => DESCRIPTION_DEVICE,
        }
    }
}

fn require(rules: &Rules, feature: Features, type_id: i32) -> UnbufferResult<()> {
    if rules.has(feature) {
        Ok(())
    } else {
        Err(BufferUnbufferError::UnsupportedDescriptionType(type_id))
    }
}

impl UnbufferVersioned for ModelDescription {
    fn unbuffer_versioned<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Self> {
        let type_id = i32::unbuffer_from(buf)?;
        let description = match type_id {
            DESCRIPTION_MARKER_SET => ModelDescription::MarkerSet(MarkerSetDescription {
                name: unbuffer_cstring(buf)?,
                marker_names: unbuffer_names(buf)?,
            }),
            DESCRIPTION_RIGID_BODY => {
                ModelDescription::RigidBody(RigidBodyDescription::unbuffer_versioned(buf, rules)?)
            }
            DESCRIPTION_SKELETON => ModelDescription::Skeleton(SkeletonDescription {
                name: unbuffer_cstring(buf)?,
                id: i32::unbuffer_from(buf)?,
                bones: unbuffer_list(buf, RIGID_BODY_DESCRIPTION_MIN_SIZE, |buf| {
                    RigidBodyDescription::unbuffer_versioned(buf, rules)
                })?,
            }),
            DESCRIPTION_FORCE_PLATE => {
                require(rules, Features::FORCE_PLATE_DESCRIPTIONS, type_id)?;
                ModelDescription::ForcePlate(ForcePlateDescription::unbuffer_from(buf)?)
            }
            DESCRIPTION_DEVICE => {
                require(rules, Features::DEVICE_DESCRIPTIONS, type_id)?;
                ModelDescription::Device(DeviceDescription {
                    id: i32::unbuffer_from(buf)?,
                    name: unbuffer_cstring(buf)?,
                    serial: unbuffer_cstring(buf)?,
                    device_type: i32::unbuffer_from(buf)?,
                    channel_data_type: i32::unbuffer_from(buf)?,
                    channel_names: unbuffer_names(buf)?,
                })
            }
            _ => return Err(BufferUnbufferError::UnknownDescriptionType(type_id)),
        };
        Ok(description)
    }
}

impl BufferVersioned for ModelDescription {
    fn buffer_versioned<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult {
        self.type_id().buffer_to(buf)?;
        match self {
            ModelDescription::MarkerSet(d) => {
                buffer_cstring(buf, &d.name)?;
                buffer_names(buf, &d.marker_names)
            }
            ModelDescription::RigidBody(d) => d.buffer_versioned(buf, rules),
            ModelDescription::Skeleton(d) => {
                buffer_cstring(buf, &d.name)?;
                d.id.buffer_to(buf)?;
                buffer_list(buf, &d.bones, |bone, buf| bone.buffer_versioned(buf, rules))
            }
            ModelDescription::ForcePlate(d) => d.encode(buf),
            ModelDescription::Device(d) => {
                d.id.buffer_to(buf)?;
                buffer_cstring(buf, &d.name)?;
                buffer_cstring(buf, &d.serial)?;
                d.device_type.buffer_to(buf)?;
                d.channel_data_type.buffer_to(buf)?;
                buffer_names(buf, &d.channel_names)
            }
        }
    }
}

/// Smallest possible description: a type and a one-byte name.
const MODEL_DESCRIPTION_MIN_SIZE: usize = 4 + 1;

pub(crate) fn unbuffer_model_definitions<T: Buf>(
    buf: &mut T,
    rules: &Rules,
) -> UnbufferResult<Vec<ModelDescription>> {
    unbuffer_list(buf, MODEL_DESCRIPTION_MIN_SIZE, |buf| {
        ModelDescription::unbuffer_versioned(buf, rules)
    })
}

pub(crate) fn buffer_model_definitions<T: BufMut>(
    buf: &mut T,
    descriptions: &[ModelDescription],
    rules: &Rules,
) -> BufferResult {
    buffer_list(buf, descriptions, |d, buf| d.buffer_versioned(buf, rules))
}
