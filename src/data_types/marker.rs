// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use bytes::{Buf, BufMut};

use crate::buffer_unbuffer::{
    buffer_cstring, buffer_list, unbuffer_cstring, unbuffer_list, BufferResult, BufferTo,
    ConstantBufferSize, UnbufferFrom, UnbufferResult,
};

use super::{
    version::{BufferVersioned, Features, Rules, UnbufferVersioned},
    Vec3,
};

bitflags! {
    /// Status bits of a labeled marker.
    pub struct MarkerFlags: u16 {
        const OCCLUDED = 0x01;
        const POINT_CLOUD_SOLVED = 0x02;
        const MODEL_SOLVED = 0x04;
        const HAS_MODEL = 0x08;
        const UNLABELED = 0x10;
        const ACTIVE = 0x20;
    }
}

impl Default for MarkerFlags {
    fn default() -> Self {
        MarkerFlags::empty()
    }
}

/// A tracked point.
///
/// Unlabeled markers carry only a position. Labeled markers also carry a
/// packed id (model id in the high 16 bits, marker id in the low 16 bits),
/// a size, and depending on the version a set of flags and a residual.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Marker {
    pub id: Option<i32>,
    pub position: Vec3,
    pub size: Option<f32>,
    pub residual: Option<f32>,
    pub flags: MarkerFlags,
}

impl Marker {
    /// An unlabeled marker at a position.
    pub fn unlabeled(position: Vec3) -> Marker {
        Marker {
            position,
            ..Default::default()
        }
    }

    /// Id of the model this marker belongs to, if labeled.
    pub fn model_id(&self) -> Option<i32> {
        self.id.map(|id| id >> 16)
    }

    /// Id of the marker within its model, if labeled.
    pub fn marker_id(&self) -> Option<i32> {
        self.id.map(|id| id & 0xffff)
    }

    pub fn is_occluded(&self) -> bool {
        self.flags.contains(MarkerFlags::OCCLUDED)
    }
}

/// Smallest possible labeled marker: id, position, size.
pub(crate) const LABELED_MARKER_MIN_SIZE: usize = 4 + 12 + 4;

impl UnbufferVersioned for Marker {
    fn unbuffer_versioned<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Self> {
        let id = i32::unbuffer_from(buf)?;
        let position = Vec3::unbuffer_from(buf)?;
        let size = f32::unbuffer_from(buf)?;
        let flags = if rules.has(Features::MARKER_PARAMS) {
            MarkerFlags::from_bits_truncate(i16::unbuffer_from(buf)? as u16)
        } else {
            MarkerFlags::empty()
        };
        let residual = if rules.has(Features::MARKER_RESIDUAL) {
            Some(f32::unbuffer_from(buf)?)
        } else {
            None
        };
        Ok(Marker {
            id: Some(id),
            position,
            size: Some(size),
            residual,
            flags,
        })
    }
}

impl BufferVersioned for Marker {
    fn buffer_versioned<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult {
        self.id.unwrap_or_default().buffer_to(buf)?;
        self.position.buffer_to(buf)?;
        self.size.unwrap_or_default().buffer_to(buf)?;
        if rules.has(Features::MARKER_PARAMS) {
            (self.flags.bits() as i16).buffer_to(buf)?;
        }
        if rules.has(Features::MARKER_RESIDUAL) {
            self.residual.unwrap_or_default().buffer_to(buf)?;
        }
        Ok(())
    }
}

/// A named group of marker positions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkerSet {
    pub name: String,
    pub markers: Vec<Vec3>,
}

/// Smallest possible marker set: an empty name and a zero count.
pub(crate) const MARKER_SET_MIN_SIZE: usize = 1 + 4;

impl UnbufferFrom for MarkerSet {
    fn unbuffer_from<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
        let name = unbuffer_cstring(buf)?;
        let markers = unbuffer_list(buf, Vec3::constant_buffer_size(), Vec3::unbuffer_from)?;
        Ok(MarkerSet { name, markers })
    }
}

impl MarkerSet {
    pub(crate) fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult {
        buffer_cstring(buf, &self.name)?;
        buffer_list(buf, &self.markers, |m, buf| m.buffer_to(buf))
    }
}
