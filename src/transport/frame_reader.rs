// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::trace;

use super::{Transport, TransportError};

/// One datagram and when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

/// Reads timestamped datagrams from a transport, one poll interval at a time.
#[derive(Clone)]
pub struct FrameReader {
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
}

impl FrameReader {
    pub fn new(transport: Arc<dyn Transport>, poll_interval: Duration) -> FrameReader {
        FrameReader {
            transport,
            poll_interval,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Wait one poll interval for a datagram. Empty datagrams are dropped.
    pub fn read(&self) -> Result<Option<Datagram>, TransportError> {
        match self.transport.receive(self.poll_interval)? {
            Some(payload) if payload.is_empty() => {
                trace!("dropping empty datagram");
                Ok(None)
            }
            Some(payload) => {
                trace!(len = payload.len(), "received datagram");
                Ok(Some(Datagram {
                    payload,
                    received_at: Utc::now(),
                }))
            }
            None => Ok(None),
        }
    }
}
