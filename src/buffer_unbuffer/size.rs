// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Fixed wire widths.

use super::{unbuffer::UnbufferConstantSize, BufferTo};

/// A value whose wire form is always the same number of bytes.
///
/// The default is the in-memory size, which is right for the primitives.
pub trait ConstantBufferSize {
    fn constant_buffer_size() -> usize
    where
        Self: Sized,
    {
        std::mem::size_of::<Self>()
    }
}

/// A newtype over a single fixed-width field, such as a message id.
///
/// Implementors get `BufferTo`, `UnbufferFrom` and `ConstantBufferSize` through the inner type.
pub trait WrappedConstantSize {
    type WrappedType: BufferTo + UnbufferConstantSize + ConstantBufferSize;

    fn get(&self) -> Self::WrappedType;
    fn new(v: Self::WrappedType) -> Self;
}

impl<T: WrappedConstantSize> ConstantBufferSize for T {
    fn constant_buffer_size() -> usize {
        T::WrappedType::constant_buffer_size()
    }
}
