// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Null-terminated strings, either scanned for their terminator or fixed-width.
//!
//! Invalid UTF-8 is replaced rather than rejected: a badly encoded model name
//! should not cost the rest of the frame.

use bytes::{Buf, BufMut};

use super::{check_unbuffer_remaining, BufferResult, BufferUnbufferError, UnbufferResult};

/// Read bytes up to and including a null terminator.
pub fn unbuffer_cstring<T: Buf>(buf: &mut T) -> UnbufferResult<String> {
    let mut bytes = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(BufferUnbufferError::UnterminatedString);
        }
        match buf.get_u8() {
            0 => break,
            b => bytes.push(b),
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a fixed-width field holding a null-padded string.
pub fn unbuffer_fixed_cstring<T: Buf>(buf: &mut T, width: usize) -> UnbufferResult<String> {
    check_unbuffer_remaining(buf, width)?;
    let field = buf.copy_to_bytes(width);
    let len = field.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&field[..len]).into_owned())
}

/// Write a string followed by a null terminator.
///
/// Anything after an embedded null would be unreadable, so it is dropped.
pub fn buffer_cstring<T: BufMut>(buf: &mut T, s: &str) -> BufferResult {
    let bytes = s.as_bytes();
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    buf.put_slice(&bytes[..len]);
    buf.put_u8(0);
    Ok(())
}

/// Write a string into a fixed-width, null-padded field, truncating if needed.
pub fn buffer_fixed_cstring<T: BufMut>(buf: &mut T, s: &str, width: usize) -> BufferResult {
    let bytes = s.as_bytes();
    let len = bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len())
        .min(width.saturating_sub(1));
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, width - len);
    Ok(())
}
