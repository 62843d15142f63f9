// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Routines and traits to buffer/unbuffer to/from little-endian byte buffers.

pub mod buffer;
pub mod constants;
mod error;
mod primitives;
mod size;
mod strings;
pub mod unbuffer;

#[doc(inline)]
pub use crate::buffer_unbuffer::{
    error::BufferUnbufferError,
    size::{ConstantBufferSize, WrappedConstantSize},
};

pub use crate::buffer_unbuffer::{
    buffer::{buffer_count, buffer_list, BufferResult, BufferTo},
    strings::{buffer_cstring, buffer_fixed_cstring, unbuffer_cstring, unbuffer_fixed_cstring},
    unbuffer::{
        check_unbuffer_remaining, unbuffer_count, unbuffer_list, UnbufferConstantSize, UnbufferFrom,
        UnbufferResult,
    },
};
