// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use super::{
    size::ConstantBufferSize, unbuffer::UnbufferConstantSize, BufferResult, BufferTo,
    UnbufferResult,
};
use bytes::{Buf, BufMut};

// NatNet is little-endian on the wire, unlike most network protocols.
macro_rules! buffer_primitive {
    ($t:ty, $put:ident, $get:ident) => {
        impl ConstantBufferSize for $t {}

        impl BufferTo for $t {
            fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult {
                buf.$put(*self);
                Ok(())
            }
        }

        impl UnbufferConstantSize for $t {
            fn unbuffer_constant_size<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
                Ok(buf.$get())
            }
        }
    };
}

buffer_primitive!(u8, put_u8, get_u8);
buffer_primitive!(i16, put_i16_le, get_i16_le);
buffer_primitive!(u16, put_u16_le, get_u16_le);
buffer_primitive!(i32, put_i32_le, get_i32_le);
buffer_primitive!(u32, put_u32_le, get_u32_le);
buffer_primitive!(u64, put_u64_le, get_u64_le);
buffer_primitive!(f32, put_f32_le, get_f32_le);
buffer_primitive!(f64, put_f64_le, get_f64_le);
