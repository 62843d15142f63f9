// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Writing values in wire order.

use std::convert::TryFrom;

use bytes::BufMut;

use super::{BufferUnbufferError, WrappedConstantSize};

pub type BufferResult = std::result::Result<(), BufferUnbufferError>;

/// Serializes itself onto the end of a growable buffer.
pub trait BufferTo {
    fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult;
}

impl<T: WrappedConstantSize> BufferTo for T {
    fn buffer_to<U: BufMut>(&self, buf: &mut U) -> BufferResult {
        self.get().buffer_to(buf)
    }
}

/// Write an element count as the signed 32-bit field the protocol uses.
pub fn buffer_count<T: BufMut>(buf: &mut T, count: usize) -> BufferResult {
    let count = i32::try_from(count).map_err(|_| BufferUnbufferError::CountOverflow(count))?;
    count.buffer_to(buf)
}

/// Write a counted list, buffering each element with `f`.
pub fn buffer_list<B: BufMut, T>(
    buf: &mut B,
    items: &[T],
    mut f: impl FnMut(&T, &mut B) -> BufferResult,
) -> BufferResult {
    buffer_count(buf, items.len())?;
    items.iter().try_for_each(|item| f(item, buf))
}
