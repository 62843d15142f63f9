// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

// Connects to a NatNet server and prints what it streams.
// Usage: natnet_print_frames [natnet://server[:port]?local=...] [seconds]

extern crate natnet;

use std::time::Duration;

use natnet::{
    ClientConfig, FrameInfo, Marker, MotionClient, MotionListener, NatNetError, RigidBody,
    ServerInfo, Skeleton, TimeInfo, TransportError,
};
use tracing::{info, warn};

struct Printer;

impl MotionListener for Printer {
    fn on_version(&mut self, server_info: &ServerInfo) {
        println!(
            "{} {} speaking NatNet {}",
            server_info.app_name, server_info.app_version, server_info.natnet_version
        );
    }

    fn on_frame_info(&mut self, frame_info: &FrameInfo) {
        println!(
            "frame {} at {:.3}s, timecode {}",
            frame_info.frame_number, frame_info.time_info.timestamp, frame_info.timecode
        );
    }

    fn on_rigid_bodies(&mut self, rigid_bodies: &[RigidBody], _: &TimeInfo) {
        for body in rigid_bodies {
            println!(
                "  rigid body {}: {:?} {:?}{}",
                body.id,
                body.position,
                body.orientation,
                if body.tracking_valid { "" } else { " (not tracked)" }
            );
        }
    }

    fn on_skeletons(&mut self, skeletons: &[Skeleton], _: &TimeInfo) {
        for skeleton in skeletons {
            println!("  skeleton {}: {} bones", skeleton.id, skeleton.bones.len());
        }
    }

    fn on_labeled_markers(&mut self, markers: &[Marker], _: &TimeInfo) {
        if !markers.is_empty() {
            println!("  {} labeled markers", markers.len());
        }
    }

    fn on_unlabeled_markers(&mut self, markers: &[Marker], _: &TimeInfo) {
        if !markers.is_empty() {
            println!("  {} unlabeled markers", markers.len());
        }
    }

    fn on_disconnect(&mut self, error: Option<&TransportError>) {
        match error {
            Some(e) => warn!(error = %e, "stream ended"),
            None => info!("stream ended"),
        }
    }
}

fn main() -> Result<(), NatNetError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("natnet=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config: ClientConfig = match args.next() {
        Some(address) => address.parse()?,
        None => ClientConfig::default(),
    };
    let seconds = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);

    let mut client = MotionClient::new(Printer);
    let timeout = config.request_timeout;
    client.connect(&config, timeout)?;
    client.request_data()?;
    std::thread::sleep(Duration::from_secs(seconds));
    client.disconnect();
    Ok(())
}
