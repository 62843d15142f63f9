// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Positions and orientations.

use crate::buffer_unbuffer::{
    BufferResult, BufferTo, ConstantBufferSize, UnbufferConstantSize, UnbufferResult,
};
use bytes::{Buf, BufMut};

/// Fixed-width types that are just a run of `f32` fields on the wire, in declaration order.
macro_rules! f32_fields {
    ($name:ident { $($field:ident),+ }) => {
        impl ConstantBufferSize for $name {
            fn constant_buffer_size() -> usize {
                [$(stringify!($field)),+].len() * f32::constant_buffer_size()
            }
        }

        impl BufferTo for $name {
            fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult {
                $(self.$field.buffer_to(buf)?;)+
                Ok(())
            }
        }

        impl UnbufferConstantSize for $name {
            fn unbuffer_constant_size<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
                Ok($name {
                    $($field: f32::unbuffer_constant_size(buf)?,)+
                })
            }
        }
    };
}

/// Position or offset in meters, as the server's coordinate frame has it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }
}

f32_fields!(Vec3 { x, y, z });

impl From<cgmath::Vector3<f32>> for Vec3 {
    fn from(v: cgmath::Vector3<f32>) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

impl From<Vec3> for cgmath::Vector3<f32> {
    fn from(v: Vec3) -> Self {
        cgmath::Vector3::new(v.x, v.y, v.z)
    }
}

/// Orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    /// Vector part first, scalar last, as on the wire.
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Quat {
        Quat { x, y, z, w }
    }

    pub fn identity() -> Quat {
        Quat::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

f32_fields!(Quat { x, y, z, w });

impl From<cgmath::Quaternion<f32>> for Quat {
    fn from(q: cgmath::Quaternion<f32>) -> Self {
        Quat::new(q.v.x, q.v.y, q.v.z, q.s)
    }
}

impl From<Quat> for cgmath::Quaternion<f32> {
    fn from(q: Quat) -> Self {
        cgmath::Quaternion::new(q.w, q.x, q.y, q.z)
    }
}
