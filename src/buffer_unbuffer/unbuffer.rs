// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Reading values back out of a packet.

use super::{BufferUnbufferError, ConstantBufferSize, WrappedConstantSize};
use bytes::Buf;

pub type UnbufferResult<T> = std::result::Result<T, BufferUnbufferError>;

/// Parses itself from the front of a buffer, consuming what it reads.
///
/// A short buffer yields `NeedMoreData`. Fixed-width reads check their length
/// first so that a failed read consumes nothing.
pub trait UnbufferFrom: Sized {
    fn unbuffer_from<T: Buf>(buf: &mut T) -> UnbufferResult<Self>;
}

/// Read half of a fixed-width value, called only once the bytes are known to be there.
pub trait UnbufferConstantSize: Sized + ConstantBufferSize {
    fn unbuffer_constant_size<T: Buf>(buf: &mut T) -> UnbufferResult<Self>;
}

impl<T: UnbufferConstantSize> UnbufferFrom for T {
    fn unbuffer_from<U: Buf>(buf: &mut U) -> UnbufferResult<Self> {
        check_unbuffer_remaining(buf, Self::constant_buffer_size())?;
        Self::unbuffer_constant_size(buf)
    }
}

impl<T: WrappedConstantSize> UnbufferConstantSize for T {
    fn unbuffer_constant_size<U: Buf>(buf: &mut U) -> UnbufferResult<Self> {
        T::WrappedType::unbuffer_constant_size(buf).map(T::new)
    }
}

/// Fail with the shortfall unless `len` bytes remain.
pub fn check_unbuffer_remaining<T: Buf>(buf: &T, len: usize) -> UnbufferResult<()> {
    match len.checked_sub(buf.remaining()) {
        Some(missing) if missing > 0 => Err(BufferUnbufferError::NeedMoreData(missing)),
        _ => Ok(()),
    }
}

/// Read a signed 32-bit element count and validate it against the bytes left.
///
/// `min_element_size` is the smallest number of bytes one element can occupy.
/// A count that could not possibly fit in the remaining buffer is rejected
/// before the caller allocates anything proportional to it.
///
/// ```
/// use natnet::buffer_unbuffer::unbuffer_count;
/// let mut buf = &[2u8, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8][..];
/// assert_eq!(unbuffer_count(&mut buf, 4).unwrap(), 2);
/// let mut buf = &[3u8, 0, 0, 0, 1, 2, 3, 4][..];
/// assert!(unbuffer_count(&mut buf, 4).is_err());
/// ```
pub fn unbuffer_count<T: Buf>(buf: &mut T, min_element_size: usize) -> UnbufferResult<usize> {
    let count = i32::unbuffer_from(buf)?;
    if count < 0 {
        return Err(BufferUnbufferError::NegativeCount(count));
    }
    let remaining = buf.remaining();
    if min_element_size > 0 && count as usize > remaining / min_element_size {
        return Err(BufferUnbufferError::ImplausibleCount { count, remaining });
    }
    Ok(count as usize)
}

/// Read a counted list, unbuffering each element with `f`.
pub fn unbuffer_list<B: Buf, T>(
    buf: &mut B,
    min_element_size: usize,
    mut f: impl FnMut(&mut B) -> UnbufferResult<T>,
) -> UnbufferResult<Vec<T>> {
    let count = unbuffer_count(buf, min_element_size)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(f(buf)?);
    }
    Ok(items)
}
