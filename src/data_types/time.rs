// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

/*!
 * Timing information that accompanies each data frame.
 */

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};

/// SMPTE timecode packed as hours, minutes, seconds and frames, plus a subframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timecode {
    pub timecode: u32,
    pub subframe: u32,
}

impl Timecode {
    pub fn new(timecode: u32, subframe: u32) -> Self {
        Self { timecode, subframe }
    }

    pub fn hours(&self) -> u32 {
        (self.timecode >> 24) & 0xff
    }

    pub fn minutes(&self) -> u32 {
        (self.timecode >> 16) & 0xff
    }

    pub fn seconds(&self) -> u32 {
        (self.timecode >> 8) & 0xff
    }

    pub fn frames(&self) -> u32 {
        self.timecode & 0xff
    }
}

/// Formats as `hh:mm:ss:ff.sub`.
///
/// ```
/// use natnet::Timecode;
/// let tc = Timecode::new(0x0102_0304, 5);
/// assert_eq!(tc.to_string(), "01:02:03:04.5");
/// ```
impl Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}.{}",
            self.hours(),
            self.minutes(),
            self.seconds(),
            self.frames(),
            self.subframe
        )
    }
}

/// Timestamps of one frame.
///
/// The high-resolution fields are counter ticks on the server, sent from
/// 3.0 onwards; convert them with the clock frequency from the server info.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeInfo {
    /// Seconds since the server started.
    pub timestamp: f64,
    pub camera_mid_exposure: Option<u64>,
    pub camera_data_received: Option<u64>,
    pub transmit: Option<u64>,
    /// Ticks per second of the high-resolution counter.
    pub clock_frequency: Option<u64>,
    /// When this client received the datagram. Not part of the packet.
    pub received_at: Option<DateTime<Utc>>,
}

impl TimeInfo {
    /// Convert server counter ticks to seconds.
    pub fn ticks_to_seconds(&self, ticks: u64) -> Option<f64> {
        match self.clock_frequency {
            Some(freq) if freq > 0 => Some(ticks as f64 / freq as f64),
            _ => None,
        }
    }

    /// Seconds from camera mid-exposure until the server transmitted the frame.
    pub fn system_latency(&self) -> Option<f64> {
        let exposure = self.camera_mid_exposure?;
        let transmit = self.transmit?;
        self.ticks_to_seconds(transmit.checked_sub(exposure)?)
    }

    /// Seconds from camera mid-exposure until the server received the camera data.
    pub fn camera_latency(&self) -> Option<f64> {
        let exposure = self.camera_mid_exposure?;
        let received = self.camera_data_received?;
        self.ticks_to_seconds(received.checked_sub(exposure)?)
    }
}
