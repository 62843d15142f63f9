// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use std::collections::HashSet;

use bytes::{Buf, BufMut};

use crate::buffer_unbuffer::{
    buffer_count, buffer_list, unbuffer_count, unbuffer_list, BufferResult, BufferTo,
    BufferUnbufferError, UnbufferFrom, UnbufferResult,
};

use super::{
    version::{BufferVersioned, Features, Rules, UnbufferVersioned},
    Marker, Quat, Vec3,
};

/// Bit 0 of the rigid body params short.
const TRACKING_VALID: i16 = 0x01;

/// A tracked object with a position and orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub id: i32,
    pub position: Vec3,
    pub orientation: Quat,
    /// Mean marker error, when the version reports it.
    pub mean_error: Option<f32>,
    /// Always true for versions without a params field.
    pub tracking_valid: bool,
    /// Only sent inline by versions before 3.0.
    pub markers: Vec<Marker>,
}

impl RigidBody {
    pub fn new(id: i32, position: Vec3, orientation: Quat) -> RigidBody {
        RigidBody {
            id,
            position,
            orientation,
            mean_error: None,
            tracking_valid: true,
            markers: Vec::new(),
        }
    }

    /// For skeleton bones: the skeleton id packed into the high 16 bits.
    pub fn skeleton_id(&self) -> i32 {
        self.id >> 16
    }

    /// For skeleton bones: the bone id packed into the low 16 bits.
    pub fn bone_id(&self) -> i32 {
        self.id & 0xffff
    }
}

/// Smallest possible rigid body: id, position, orientation.
pub(crate) const RIGID_BODY_MIN_SIZE: usize = 4 + 12 + 16;

/// Inline rigid body marker: position, id, size.
const INLINE_MARKER_SIZE: usize = 12 + 4 + 4;

fn unbuffer_inline_markers<T: Buf>(buf: &mut T) -> UnbufferResult<Vec<Marker>> {
    let count = unbuffer_count(buf, INLINE_MARKER_SIZE)?;
    let mut markers = (0..count)
        .map(|_| Vec3::unbuffer_from(buf).map(Marker::unlabeled))
        .collect::<UnbufferResult<Vec<_>>>()?;
    for marker in &mut markers {
        marker.id = Some(i32::unbuffer_from(buf)?);
    }
    for marker in &mut markers {
        marker.size = Some(f32::unbuffer_from(buf)?);
    }
    Ok(markers)
}

fn buffer_inline_markers<T: BufMut>(buf: &mut T, markers: &[Marker]) -> BufferResult {
    buffer_count(buf, markers.len())?;
    for marker in markers {
        marker.position.buffer_to(buf)?;
    }
    for marker in markers {
        marker.id.unwrap_or_default().buffer_to(buf)?;
    }
    for marker in markers {
        marker.size.unwrap_or_default().buffer_to(buf)?;
    }
    Ok(())
}

impl UnbufferVersioned for RigidBody {
    fn unbuffer_versioned<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Self> {
        let id = i32::unbuffer_from(buf)?;
        let position = Vec3::unbuffer_from(buf)?;
        let orientation = Quat::unbuffer_from(buf)?;
        let markers = if rules.has(Features::RIGID_BODY_MARKERS) {
            unbuffer_inline_markers(buf)?
        } else {
            Vec::new()
        };
        let mean_error = if rules.has(Features::RIGID_BODY_MEAN_ERROR) {
            Some(f32::unbuffer_from(buf)?)
        } else {
            None
        };
        let tracking_valid = if rules.has(Features::RIGID_BODY_PARAMS) {
            i16::unbuffer_from(buf)? & TRACKING_VALID != 0
        } else {
            true
        };
        Ok(RigidBody {
            id,
            position,
            orientation,
            mean_error,
            tracking_valid,
            markers,
        })
    }
}

impl BufferVersioned for RigidBody {
    fn buffer_versioned<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult {
        self.id.buffer_to(buf)?;
        self.position.buffer_to(buf)?;
        self.orientation.buffer_to(buf)?;
        if rules.has(Features::RIGID_BODY_MARKERS) {
            buffer_inline_markers(buf, &self.markers)?;
        }
        if rules.has(Features::RIGID_BODY_MEAN_ERROR) {
            self.mean_error.unwrap_or_default().buffer_to(buf)?;
        }
        if rules.has(Features::RIGID_BODY_PARAMS) {
            let params = if self.tracking_valid { TRACKING_VALID } else { 0 };
            params.buffer_to(buf)?;
        }
        Ok(())
    }
}

/// Read a counted list of rigid bodies, rejecting repeated ids.
pub(crate) fn unbuffer_rigid_bodies<T: Buf>(
    buf: &mut T,
    rules: &Rules,
) -> UnbufferResult<Vec<RigidBody>> {
    let bodies = unbuffer_list(buf, RIGID_BODY_MIN_SIZE, |buf| {
        RigidBody::unbuffer_versioned(buf, rules)
    })?;
    check_unique_ids(bodies.iter().map(|b| b.id))?;
    Ok(bodies)
}

pub(crate) fn buffer_rigid_bodies<T: BufMut>(
    buf: &mut T,
    bodies: &[RigidBody],
    rules: &Rules,
) -> BufferResult {
    buffer_list(buf, bodies, |b, buf| b.buffer_versioned(buf, rules))
}

/// Fail on the first id seen twice.
pub(crate) fn check_unique_ids(ids: impl Iterator<Item = i32>) -> UnbufferResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BufferUnbufferError::DuplicateId(id));
        }
    }
    Ok(())
}

/// A set of rigid bodies forming one articulated model.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub id: i32,
    /// Bones in the order they were sent.
    pub bones: Vec<RigidBody>,
}

impl Skeleton {
    /// Find a bone by its bone id (the low 16 bits of its rigid body id).
    pub fn bone(&self, bone_id: i32) -> Option<&RigidBody> {
        self.bones.iter().find(|b| b.bone_id() == bone_id)
    }
}

/// Smallest possible skeleton: id and an empty bone count.
pub(crate) const SKELETON_MIN_SIZE: usize = 4 + 4;

impl UnbufferVersioned for Skeleton {
    fn unbuffer_versioned<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Self> {
        let id = i32::unbuffer_from(buf)?;
        let bones = unbuffer_rigid_bodies(buf, rules)?;
        Ok(Skeleton { id, bones })
    }
}

impl BufferVersioned for Skeleton {
    fn buffer_versioned<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult {
        self.id.buffer_to(buf)?;
        buffer_rigid_bodies(buf, &self.bones, rules)
    }
}
