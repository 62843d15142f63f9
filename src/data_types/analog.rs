// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use bytes::{Buf, BufMut};

use crate::buffer_unbuffer::{
    buffer_list, unbuffer_list, BufferResult, BufferTo, ConstantBufferSize, UnbufferFrom,
    UnbufferResult,
};

/// Sampled analog channels of a force plate or other peripheral device.
///
/// Each channel holds the samples taken since the previous mocap frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalogDevice {
    pub id: i32,
    pub channels: Vec<Vec<f32>>,
}

impl AnalogDevice {
    /// Most recent sample of a channel.
    pub fn latest(&self, channel: usize) -> Option<f32> {
        self.channels.get(channel)?.last().copied()
    }
}

/// Smallest possible device: id and an empty channel count.
pub(crate) const ANALOG_DEVICE_MIN_SIZE: usize = 4 + 4;

impl UnbufferFrom for AnalogDevice {
    fn unbuffer_from<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
        let id = i32::unbuffer_from(buf)?;
        let channels = unbuffer_list(buf, 4, |buf| {
            unbuffer_list(buf, f32::constant_buffer_size(), f32::unbuffer_from)
        })?;
        Ok(AnalogDevice { id, channels })
    }
}

impl AnalogDevice {
    pub(crate) fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult {
        self.id.buffer_to(buf)?;
        buffer_list(buf, &self.channels, |channel, buf| {
            buffer_list(buf, channel, |v, buf| v.buffer_to(buf))
        })
    }
}
