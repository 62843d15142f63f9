// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Protocol versions and the layout features each one carries.
//!
//! Every optional field in the wire format is gated on exactly one
//! [`Features`] flag, and the flags a version has come from a single table
//! of version ranges.

use std::fmt::{self, Display};

use bytes::{Buf, BufMut};

use crate::buffer_unbuffer::{
    BufferResult, BufferTo, ConstantBufferSize, UnbufferConstantSize, UnbufferResult,
};

/// A four-part protocol or application version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub revision: u8,
}

impl ProtocolVersion {
    pub const fn new(major: u8, minor: u8, build: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Create from just a major and minor version.
    pub const fn major_minor(major: u8, minor: u8) -> Self {
        Self::new(major, minor, 0, 0)
    }

    /// Whether this client knows how to decode data from this version.
    ///
    /// ```
    /// use natnet::ProtocolVersion;
    /// assert!(ProtocolVersion::new(3, 1, 0, 0).is_supported());
    /// assert!(!ProtocolVersion::new(1, 9, 0, 0).is_supported());
    /// assert!(!ProtocolVersion::new(4, 1, 0, 0).is_supported());
    /// ```
    pub fn is_supported(&self) -> bool {
        *self >= MIN_SUPPORTED && *self < MAX_SUPPORTED_EXCLUSIVE
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl ConstantBufferSize for ProtocolVersion {
    fn constant_buffer_size() -> usize {
        4
    }
}

impl BufferTo for ProtocolVersion {
    fn buffer_to<T: BufMut>(&self, buf: &mut T) -> BufferResult {
        self.major.buffer_to(buf)?;
        self.minor.buffer_to(buf)?;
        self.build.buffer_to(buf)?;
        self.revision.buffer_to(buf)
    }
}

impl UnbufferConstantSize for ProtocolVersion {
    fn unbuffer_constant_size<T: Buf>(buf: &mut T) -> UnbufferResult<Self> {
        Ok(Self::new(buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()))
    }
}

/// Oldest version whose data frames can be decoded.
pub const MIN_SUPPORTED: ProtocolVersion = ProtocolVersion::major_minor(2, 0);

/// First version too new to decode.
pub const MAX_SUPPORTED_EXCLUSIVE: ProtocolVersion = ProtocolVersion::major_minor(4, 1);

bitflags! {
    /// Optional pieces of the wire layout.
    pub struct Features: u32 {
        /// Marker positions, ids and sizes inline in each rigid body.
        const RIGID_BODY_MARKERS = 1 << 0;
        const RIGID_BODY_MEAN_ERROR = 1 << 1;
        /// Rigid body params short, carrying the tracking-valid bit.
        const RIGID_BODY_PARAMS = 1 << 2;
        const SKELETONS = 1 << 3;
        const LABELED_MARKERS = 1 << 4;
        const MARKER_PARAMS = 1 << 5;
        const MARKER_RESIDUAL = 1 << 6;
        const FORCE_PLATES = 1 << 7;
        const DEVICES = 1 << 8;
        const SOFTWARE_LATENCY = 1 << 9;
        /// Frame timestamp is an f64 rather than an f32.
        const DOUBLE_TIMESTAMP = 1 << 10;
        const HIGH_RES_TIMESTAMPS = 1 << 11;
        /// Rigid body descriptions list their marker offsets and active labels.
        const RIGID_BODY_DESCRIPTION_MARKERS = 1 << 12;
        const FORCE_PLATE_DESCRIPTIONS = 1 << 13;
        const DEVICE_DESCRIPTIONS = 1 << 14;
        /// Server info ends with clock frequency, data port and multicast settings.
        const SERVER_CONNECTION_INFO = 1 << 15;
        /// Rigid body description markers are followed by their names.
        const RIGID_BODY_DESCRIPTION_MARKER_NAMES = 1 << 16;
    }
}

struct FeatureRange {
    features: Features,
    since: ProtocolVersion,
    until: Option<ProtocolVersion>,
}

const fn since(features: Features, major: u8, minor: u8) -> FeatureRange {
    FeatureRange {
        features,
        since: ProtocolVersion::major_minor(major, minor),
        until: None,
    }
}

const fn between(features: Features, since: (u8, u8), until: (u8, u8)) -> FeatureRange {
    FeatureRange {
        features,
        since: ProtocolVersion::major_minor(since.0, since.1),
        until: Some(ProtocolVersion::major_minor(until.0, until.1)),
    }
}

const FEATURE_TABLE: &[FeatureRange] = &[
    between(Features::RIGID_BODY_MARKERS, (2, 0), (3, 0)),
    since(Features::RIGID_BODY_MEAN_ERROR, 2, 0),
    since(Features::RIGID_BODY_PARAMS, 2, 6),
    since(Features::SKELETONS, 2, 1),
    since(Features::LABELED_MARKERS, 2, 3),
    since(Features::MARKER_PARAMS, 2, 6),
    since(Features::MARKER_RESIDUAL, 3, 0),
    since(Features::FORCE_PLATES, 2, 9),
    since(Features::DEVICES, 2, 11),
    between(Features::SOFTWARE_LATENCY, (2, 0), (3, 0)),
    since(Features::DOUBLE_TIMESTAMP, 2, 7),
    since(Features::HIGH_RES_TIMESTAMPS, 3, 0),
    since(Features::RIGID_BODY_DESCRIPTION_MARKERS, 3, 0),
    since(Features::FORCE_PLATE_DESCRIPTIONS, 3, 0),
    since(Features::DEVICE_DESCRIPTIONS, 3, 0),
    since(Features::SERVER_CONNECTION_INFO, 3, 0),
    since(Features::RIGID_BODY_DESCRIPTION_MARKER_NAMES, 4, 0),
];

impl Features {
    /// Look up the layout features of a version.
    pub fn for_version(version: ProtocolVersion) -> Features {
        FEATURE_TABLE
            .iter()
            .filter(|range| {
                version >= range.since && range.until.map_or(true, |until| version < until)
            })
            .fold(Features::empty(), |acc, range| acc | range.features)
    }
}

/// The layout rules for one negotiated version, computed once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    version: ProtocolVersion,
    features: Features,
}

impl Rules {
    pub fn new(version: ProtocolVersion) -> Rules {
        Rules {
            version,
            features: Features::for_version(version),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn features(&self) -> Features {
        self.features
    }

    /// Whether the version carries all of the given features.
    pub fn has(&self, features: Features) -> bool {
        self.features.contains(features)
    }
}

/// Types whose wire layout depends on the negotiated version.
pub trait UnbufferVersioned: Sized {
    fn unbuffer_versioned<T: Buf>(buf: &mut T, rules: &Rules) -> UnbufferResult<Self>;
}

/// Types whose wire layout depends on the negotiated version.
pub trait BufferVersioned {
    fn buffer_versioned<T: BufMut>(&self, buf: &mut T, rules: &Rules) -> BufferResult;
}
