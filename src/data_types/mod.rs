// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Data types

mod analog;
pub mod constants;
mod descriptions;
mod frame;
mod marker;
mod math;
mod rigid_body;
mod server_info;
mod time;
pub mod version;

use crate::buffer_unbuffer::WrappedConstantSize;

pub(crate) use crate::data_types::descriptions::{
    buffer_model_definitions, unbuffer_model_definitions,
};

#[doc(inline)]
pub use crate::data_types::{
    analog::AnalogDevice,
    descriptions::{
        DeviceDescription, ForcePlateDescription, MarkerSetDescription, ModelDescription,
        RigidBodyDescription, RigidBodyMarkerDescription, SkeletonDescription,
    },
    frame::{DataFrame, FrameFlags},
    marker::{Marker, MarkerFlags, MarkerSet},
    math::{Quat, Vec3},
    rigid_body::{RigidBody, Skeleton},
    server_info::{ConnectionInfo, ServerInfo},
    time::{TimeInfo, Timecode},
    version::{Features, ProtocolVersion, Rules},
};

/// The 16-bit message type at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u16);

impl WrappedConstantSize for MessageId {
    type WrappedType = u16;
    fn get(&self) -> Self::WrappedType {
        self.0
    }
    fn new(v: Self::WrappedType) -> Self {
        MessageId(v)
    }
}
