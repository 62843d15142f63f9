// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

extern crate natnet;
extern crate proptest;

use natnet::{
    codec::encode_packet,
    data_types::{
        Features, MarkerSetDescription, RigidBodyDescription, RigidBodyMarkerDescription,
    },
    AnalogDevice, DataFrame, DecodeError, Marker, MarkerFlags, MarkerSet, ModelDescription,
    Packet, PacketDecoder, ProtocolVersion, Quat, Response, RigidBody, Rules, Skeleton, TimeInfo,
    Timecode, Vec3,
};
use proptest::prelude::*;

const VERSIONS: &[(u8, u8)] = &[
    (2, 0),
    (2, 1),
    (2, 3),
    (2, 5),
    (2, 6),
    (2, 7),
    (2, 9),
    (2, 10),
    (2, 11),
    (3, 0),
    (3, 1),
    (4, 0),
];

fn version() -> impl Strategy<Value = ProtocolVersion> {
    prop::sample::select(VERSIONS).prop_map(|(major, minor)| ProtocolVersion::major_minor(major, minor))
}

fn vec3() -> impl Strategy<Value = Vec3> {
    (-100.0f32..100.0, -100.0f32..100.0, -100.0f32..100.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn quat() -> impl Strategy<Value = Quat> {
    (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0)
        .prop_map(|(x, y, z, w)| Quat::new(x, y, z, w))
}

fn inline_markers() -> impl Strategy<Value = Vec<Marker>> {
    prop::collection::vec((vec3(), 0i32..50, 0.0f32..0.05), 0..3).prop_map(|markers| {
        markers
            .into_iter()
            .map(|(position, id, size)| Marker {
                id: Some(id),
                size: Some(size),
                ..Marker::unlabeled(position)
            })
            .collect()
    })
}

fn rigid_body(id: i32) -> impl Strategy<Value = RigidBody> {
    (vec3(), quat(), 0.0f32..0.01, any::<bool>(), inline_markers()).prop_map(
        move |(position, orientation, mean_error, tracking_valid, markers)| RigidBody {
            mean_error: Some(mean_error),
            tracking_valid,
            markers,
            ..RigidBody::new(id, position, orientation)
        },
    )
}

fn rigid_bodies() -> impl Strategy<Value = Vec<RigidBody>> {
    (0usize..4).prop_flat_map(|n| (1..=n as i32).map(rigid_body).collect::<Vec<_>>())
}

fn skeletons() -> impl Strategy<Value = Vec<Skeleton>> {
    (0usize..3, 0usize..3).prop_flat_map(|(skeletons, bones)| {
        (1..=skeletons as i32)
            .map(|id| {
                (1..=bones as i32)
                    .map(|bone| rigid_body((id << 16) | bone))
                    .collect::<Vec<_>>()
                    .prop_map(move |bones| Skeleton { id, bones })
            })
            .collect::<Vec<_>>()
    })
}

fn labeled_markers() -> impl Strategy<Value = Vec<Marker>> {
    let labeled = (
        0i32..4,
        0i32..50,
        vec3(),
        0.0f32..0.05,
        prop::option::of(0.0f32..0.01),
        0u16..0x40,
    );
    prop::collection::vec(labeled, 0..5).prop_map(|markers| {
        markers
            .into_iter()
            .map(|(model, marker, position, size, residual, flags)| Marker {
                id: Some((model << 16) | marker),
                position,
                size: Some(size),
                residual,
                flags: MarkerFlags::from_bits_truncate(flags),
            })
            .collect()
    })
}

fn marker_sets() -> impl Strategy<Value = Vec<MarkerSet>> {
    prop::collection::vec(("[a-z]{1,8}", prop::collection::vec(vec3(), 0..3)), 0..3).prop_map(
        |sets| {
            sets.into_iter()
                .map(|(name, markers)| MarkerSet { name, markers })
                .collect()
        },
    )
}

fn analog_devices() -> impl Strategy<Value = Vec<AnalogDevice>> {
    prop::collection::vec(
        prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 0..3), 0..3),
        0..2,
    )
    .prop_map(|devices| {
        devices
            .into_iter()
            .enumerate()
            .map(|(i, channels)| AnalogDevice {
                id: i as i32 + 1,
                channels,
            })
            .collect()
    })
}

fn timing() -> impl Strategy<Value = (Option<f32>, Timecode, TimeInfo)> {
    (
        prop::option::of(0.0f32..0.1),
        any::<u32>(),
        any::<u32>(),
        0.0f64..100_000.0,
        prop::option::of(any::<(u64, u64, u64)>()),
    )
        .prop_map(|(latency, timecode, subframe, timestamp, high_res)| {
            let time_info = TimeInfo {
                timestamp,
                camera_mid_exposure: high_res.map(|t| t.0),
                camera_data_received: high_res.map(|t| t.1),
                transmit: high_res.map(|t| t.2),
                ..Default::default()
            };
            (latency, Timecode::new(timecode, subframe), time_info)
        })
}

prop_compose! {
    fn frame()(
        frame_number in 0i32..1_000_000,
        marker_sets in marker_sets(),
        unlabeled in prop::collection::vec(vec3(), 0..4),
        rigid_bodies in rigid_bodies(),
        skeletons in skeletons(),
        labeled_markers in labeled_markers(),
        force_plates in analog_devices(),
        devices in analog_devices(),
        (latency, timecode, time_info) in timing(),
        flags in 0u16..4,
    ) -> DataFrame {
        DataFrame {
            frame_number,
            marker_sets,
            unlabeled_markers: unlabeled.into_iter().map(Marker::unlabeled).collect(),
            rigid_bodies,
            skeletons,
            labeled_markers,
            force_plates,
            devices,
            latency,
            timecode,
            time_info,
            flags: natnet::FrameFlags::from_bits_truncate(flags),
        }
    }
}

fn normalize_body(body: &mut RigidBody, rules: &Rules) {
    if rules.has(Features::RIGID_BODY_MARKERS) {
        for marker in &mut body.markers {
            *marker = Marker {
                id: Some(marker.id.unwrap_or_default()),
                size: Some(marker.size.unwrap_or_default()),
                ..Marker::unlabeled(marker.position)
            };
        }
    } else {
        body.markers.clear();
    }
    body.mean_error = if rules.has(Features::RIGID_BODY_MEAN_ERROR) {
        Some(body.mean_error.unwrap_or_default())
    } else {
        None
    };
    if !rules.has(Features::RIGID_BODY_PARAMS) {
        body.tracking_valid = true;
    }
}

/// The frame as it reads back after passing through a version's layout.
fn normalize(mut frame: DataFrame, rules: &Rules) -> DataFrame {
    for marker in &mut frame.unlabeled_markers {
        *marker = Marker::unlabeled(marker.position);
    }
    for body in &mut frame.rigid_bodies {
        normalize_body(body, rules);
    }
    if rules.has(Features::SKELETONS) {
        for bone in frame.skeletons.iter_mut().flat_map(|s| s.bones.iter_mut()) {
            normalize_body(bone, rules);
        }
    } else {
        frame.skeletons.clear();
    }
    if rules.has(Features::LABELED_MARKERS) {
        for marker in &mut frame.labeled_markers {
            marker.id = Some(marker.id.unwrap_or_default());
            marker.size = Some(marker.size.unwrap_or_default());
            if !rules.has(Features::MARKER_PARAMS) {
                marker.flags = MarkerFlags::empty();
            }
            marker.residual = if rules.has(Features::MARKER_RESIDUAL) {
                Some(marker.residual.unwrap_or_default())
            } else {
                None
            };
        }
    } else {
        frame.labeled_markers.clear();
    }
    if !rules.has(Features::FORCE_PLATES) {
        frame.force_plates.clear();
    }
    if !rules.has(Features::DEVICES) {
        frame.devices.clear();
    }
    frame.latency = if rules.has(Features::SOFTWARE_LATENCY) {
        Some(frame.latency.unwrap_or_default())
    } else {
        None
    };
    let time = &mut frame.time_info;
    if !rules.has(Features::DOUBLE_TIMESTAMP) {
        time.timestamp = f64::from(time.timestamp as f32);
    }
    if rules.has(Features::HIGH_RES_TIMESTAMPS) {
        time.camera_mid_exposure = Some(time.camera_mid_exposure.unwrap_or_default());
        time.camera_data_received = Some(time.camera_data_received.unwrap_or_default());
        time.transmit = Some(time.transmit.unwrap_or_default());
    } else {
        time.camera_mid_exposure = None;
        time.camera_data_received = None;
        time.transmit = None;
    }
    frame
}

fn decode_frame(decoder: &PacketDecoder, bytes: &[u8]) -> DataFrame {
    match decoder.decode(bytes).unwrap() {
        Packet::DataFrame(frame) => frame,
        other => panic!("expected a frame, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn frame_round_trip(version in version(), frame in frame()) {
        let rules = Rules::new(version);
        let decoder = PacketDecoder::new(version);
        let bytes = encode_packet(&Packet::DataFrame(frame.clone()), &rules).unwrap();
        let decoded = decode_frame(&decoder, &bytes);
        prop_assert_eq!(&decoded, &normalize(frame, &rules));

        // Whatever a version drops, the decoded frame is a fixed point.
        let again = encode_packet(&Packet::DataFrame(decoded.clone()), &rules).unwrap();
        prop_assert_eq!(&again[..], &bytes[..]);
        prop_assert_eq!(decode_frame(&decoder, &again), decoded);
    }

    #[test]
    fn every_prefix_fails(version in version(), frame in frame()) {
        let rules = Rules::new(version);
        let decoder = PacketDecoder::new(version);
        let bytes = encode_packet(&Packet::DataFrame(frame), &rules).unwrap();
        for len in 0..bytes.len() {
            prop_assert!(decoder.decode(&bytes[..len]).is_err());

            // Same prefix, with the header adjusted so only the payload is short.
            if len >= 4 {
                let mut short = bytes[..len].to_vec();
                let payload_len = (len - 4) as u16;
                short[2..4].copy_from_slice(&payload_len.to_le_bytes());
                prop_assert!(decoder.decode(&short).is_err());
            }
        }
    }

    #[test]
    fn wrong_version_never_panics(written in version(), read in version(), frame in frame()) {
        let bytes = encode_packet(&Packet::DataFrame(frame), &Rules::new(written)).unwrap();
        let _ = PacketDecoder::new(read).decode(&bytes);
    }

    #[test]
    fn arbitrary_bytes_never_panic(
        version in version(),
        message_id in 0u16..11,
        payload in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut bytes = message_id.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&payload);
        let _ = PacketDecoder::new(version).decode(&bytes);
    }

    #[test]
    fn text_packets_round_trip(version in version(), text in "[ -~]{0,40}", code in any::<i32>()) {
        let rules = Rules::new(version);
        let decoder = PacketDecoder::new(version);
        for packet in vec![
            Packet::Message(text.clone()),
            Packet::Response(Response::Text(text.clone())),
            Packet::Response(Response::Code(code)),
            Packet::UnrecognizedRequest,
        ] {
            let bytes = encode_packet(&packet, &rules).unwrap();
            prop_assert_eq!(decoder.decode(&bytes).unwrap(), packet);
        }
    }
}

#[test]
fn model_definitions_round_trip() {
    let wand = RigidBodyDescription {
        name: "Wand".into(),
        id: 1,
        parent_id: -1,
        offset: Vec3::new(0.0, 0.1, 0.0),
        markers: vec![RigidBodyMarkerDescription {
            offset: Vec3::new(0.05, 0.0, 0.0),
            active_label: 2,
            name: "Marker1".into(),
        }],
    };
    for &(major, minor) in VERSIONS {
        let version = ProtocolVersion::major_minor(major, minor);
        let rules = Rules::new(version);
        let sent = vec![
            ModelDescription::MarkerSet(MarkerSetDescription {
                name: "Wand".into(),
                marker_names: vec!["Marker1".into(), "Marker2".into()],
            }),
            ModelDescription::RigidBody(wand.clone()),
        ];
        let bytes = encode_packet(&Packet::ModelDefinitions(sent.clone()), &rules).unwrap();
        let decoded = PacketDecoder::new(version).decode(&bytes).unwrap();

        let mut expected = wand.clone();
        if !rules.has(Features::RIGID_BODY_DESCRIPTION_MARKERS) {
            expected.markers.clear();
        }
        if !rules.has(Features::RIGID_BODY_DESCRIPTION_MARKER_NAMES) {
            for marker in &mut expected.markers {
                marker.name.clear();
            }
        }
        let mut expected_descriptions = sent;
        expected_descriptions[1] = ModelDescription::RigidBody(expected);
        assert_eq!(
            decoded,
            Packet::ModelDefinitions(expected_descriptions),
            "version {}",
            version
        );
    }
}

#[test]
fn negative_count_is_malformed() {
    let decoder = PacketDecoder::new(ProtocolVersion::major_minor(3, 0));
    // frame 1, marker set count -1
    let bytes = [7, 0, 8, 0, 1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
    assert!(matches!(
        decoder.decode(&bytes),
        Err(DecodeError::MalformedSection { .. })
    ));
}

#[test]
fn implausible_count_is_malformed() {
    let decoder = PacketDecoder::new(ProtocolVersion::major_minor(3, 0));
    // frame 1, marker set count 2^30 with nothing behind it
    let bytes = [7, 0, 8, 0, 1, 0, 0, 0, 0, 0, 0, 0x40];
    assert!(matches!(
        decoder.decode(&bytes),
        Err(DecodeError::MalformedSection { .. })
    ));
}
