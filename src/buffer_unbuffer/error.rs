// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use thiserror::Error;

/// Failure while writing or reading the little-endian wire representation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferUnbufferError {
    #[error("packet ended early: {0} more bytes needed")]
    NeedMoreData(usize),
    #[error("count field is negative: {0}")]
    NegativeCount(i32),
    #[error("count field {count} is implausible with only {remaining} bytes remaining")]
    ImplausibleCount { count: i32, remaining: usize },
    #[error("string is missing its null terminator")]
    UnterminatedString,
    #[error("id {0} appears more than once")]
    DuplicateId(i32),
    #[error("unknown model description type {0}")]
    UnknownDescriptionType(i32),
    #[error("model description type {0} is not part of this protocol version")]
    UnsupportedDescriptionType(i32),
    #[error("{0} elements do not fit in a count field")]
    CountOverflow(usize),
    #[error("payload of {0} bytes does not fit in a packet")]
    PayloadTooLarge(usize),
}
