//! Frame codec properties: round trips, corruption, resynchronisation and signing.

use std::sync::Arc;

use bytes::BytesMut;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

use mavping::error::CodecError;
use mavping::protocol::{
    checksum, CodecConfig, Frame, FrameCodec, Inbound, MessageData, MessageRegistry, PingMessage,
    SignatureStatus, SigningConfig, MAV_STX_V1, MAV_STX_V2,
};
use mavping::types::EndpointIdentity;

const KEY_A: [u8; 32] = [0x11; 32];
const KEY_B: [u8; 32] = [0x22; 32];

fn codec_with(signing: Option<SigningConfig>, strict_signing: bool) -> FrameCodec {
    FrameCodec::new(
        Arc::new(MessageRegistry::standard()),
        CodecConfig {
            strict_signing,
            signing,
            ..Default::default()
        },
    )
}

fn signed_ping(seq: u32) -> BytesMut {
    let mut sender = codec_with(Some(SigningConfig::new(KEY_A, 3, true)), false);
    sender.encode_message(EndpointIdentity::new(12, 1), &PingMessage::new(5, seq, 0, 0))
}

/// Raw frame with an id that no registry knows.
fn unknown_frame_bytes() -> Vec<u8> {
    let mut frame = Frame {
        incompat_flags: 0,
        compat_flags: 0,
        sequence: 7,
        system_id: 3,
        component_id: 4,
        message_id: 0x00_2B_67,
        payload: vec![1, 2, 3, 4, 5],
        checksum: 0,
        signature: None,
    };
    frame.checksum = frame.compute_checksum(99);
    let mut buf = BytesMut::new();
    frame.write_unsigned(&mut buf);
    buf.to_vec()
}

fn arb_ping() -> impl Strategy<Value = PingMessage> {
    (any::<u64>(), any::<u32>(), any::<u8>(), any::<u8>())
        .prop_map(|(time_usec, seq, ts, tc)| PingMessage::new(time_usec, seq, ts, tc))
}

fn arb_identity() -> impl Strategy<Value = EndpointIdentity> {
    (1u8..=255, 1u8..=255).prop_map(|(s, c)| EndpointIdentity::new(s, c))
}

proptest! {
    #[test]
    fn ping_survives_encode_decode(ping in arb_ping(), from in arb_identity()) {
        let mut codec = FrameCodec::standard();
        let bytes = codec.encode_message(from, &ping);

        let decoded = codec.decode_frame(&bytes).unwrap();
        prop_assert_eq!(decoded.consumed, bytes.len());
        prop_assert_eq!(decoded.frame.system_id, from.system_id);
        prop_assert_eq!(decoded.frame.component_id, from.component_id);
        prop_assert_eq!(decoded.frame.decode_message::<PingMessage>().unwrap(), ping);
        // Trailing zero bytes never make it onto the wire
        prop_assert!(decoded.frame.payload.last().map_or(true, |b| *b != 0));
    }

    #[test]
    fn single_bit_flip_is_a_checksum_error(
        ping in arb_ping(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut codec = FrameCodec::standard();
        let mut bytes = codec.encode_message(EndpointIdentity::new(1, 1), &ping).to_vec();

        // Payload and checksum only; header flips change the framing itself
        let start = 10;
        let at = start + index.index(bytes.len() - start);
        bytes[at] ^= 1 << bit;

        let err = codec.decode_frame(&bytes).unwrap_err();
        prop_assert!(matches!(err, CodecError::Checksum { discard: 1, .. }), "{err:?}");
    }

    #[test]
    fn garbage_before_a_frame_is_skipped(
        garbage in prop::collection::vec(
            any::<u8>().prop_filter("no markers", |b| *b != MAV_STX_V2 && *b != MAV_STX_V1),
            0..64,
        ),
        seq in any::<u32>(),
    ) {
        let mut codec = FrameCodec::standard();
        let frame = codec.encode_message(EndpointIdentity::new(9, 9), &PingMessage::new(1, seq, 0, 0));

        let mut buf = BytesMut::from(&garbage[..]);
        buf.extend_from_slice(&frame);

        let item = codec.decode(&mut buf).unwrap().unwrap();
        let ping: PingMessage = item.frame().decode_message().unwrap();
        prop_assert_eq!(ping.seq, seq);
        prop_assert!(buf.is_empty());
        prop_assert_eq!(codec.stats().bytes_skipped, garbage.len() as u64);
    }

    #[test]
    fn stray_v2_marker_in_garbage_does_not_stall(
        lead in prop::collection::vec(
            any::<u8>().prop_filter("no markers", |b| *b != MAV_STX_V2 && *b != MAV_STX_V1),
            0..16,
        ),
        claimed_len in 200u8..=255,
        incompat_flags in 0u8..=1,
        tail in prop::collection::vec(
            any::<u8>().prop_filter("no markers", |b| *b != MAV_STX_V2 && *b != MAV_STX_V1),
            0..12,
        ),
        seq in any::<u32>(),
    ) {
        // The stray header claims far more bytes than will ever follow it
        let mut garbage = lead;
        garbage.extend_from_slice(&[MAV_STX_V2, claimed_len, incompat_flags]);
        garbage.extend_from_slice(&tail);

        let mut codec = FrameCodec::standard();
        let frame = codec.encode_message(EndpointIdentity::new(9, 9), &PingMessage::new(1, seq, 0, 0));
        let mut buf = BytesMut::from(&garbage[..]);
        buf.extend_from_slice(&frame);

        let item = codec.decode(&mut buf).unwrap();
        prop_assert!(item.is_some(), "frame held back behind stray marker");
        let ping: PingMessage = item.unwrap().frame().decode_message().unwrap();
        prop_assert_eq!(ping.seq, seq);
        prop_assert!(buf.is_empty());
        prop_assert_eq!(codec.stats().bytes_skipped, garbage.len() as u64);
    }
}

#[test]
fn byte_at_a_time_yields_one_frame_at_the_end() {
    let mut codec = FrameCodec::standard();
    let bytes = codec.encode_message(EndpointIdentity::new(12, 1), &PingMessage::new(77, 42, 0, 0));

    let mut buf = BytesMut::new();
    for (i, byte) in bytes.iter().enumerate() {
        buf.extend_from_slice(&[*byte]);
        let item = codec.decode(&mut buf).unwrap();
        if i + 1 < bytes.len() {
            assert!(item.is_none(), "frame emitted early at byte {i}");
        } else {
            let Some(Inbound::Frame(frame, SignatureStatus::Unsigned)) = item else {
                panic!("expected a frame, got {item:?}");
            };
            assert_eq!(frame.decode_message::<PingMessage>().unwrap().seq, 42);
        }
    }
    assert!(buf.is_empty());
}

#[test]
fn corrupted_frame_does_not_hide_the_next_one() {
    let mut codec = FrameCodec::standard();
    let mut first = codec
        .encode_message(EndpointIdentity::new(1, 1), &PingMessage::new(1, 1, 0, 0))
        .to_vec();
    let second = codec.encode_message(EndpointIdentity::new(1, 1), &PingMessage::new(1, 2, 0, 0));
    let last = first.len() - 1;
    first[last] ^= 0xFF;

    let mut buf = BytesMut::from(&first[..]);
    buf.extend_from_slice(&second);

    let item = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(item.frame().decode_message::<PingMessage>().unwrap().seq, 2);
    assert_eq!(codec.stats().checksum_errors, 1);
}

#[test]
fn unknown_message_is_passed_through_whole() {
    let mut codec = FrameCodec::standard();
    let raw = unknown_frame_bytes();
    let ping = codec.encode_message(EndpointIdentity::new(1, 1), &PingMessage::new(0, 8, 0, 0));

    let mut buf = BytesMut::from(&raw[..]);
    buf.extend_from_slice(&ping);

    let Some(Inbound::Unknown(frame)) = codec.decode(&mut buf).unwrap() else {
        panic!("expected unknown frame");
    };
    assert_eq!(frame.message_id, 0x00_2B_67);
    assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);
    assert_eq!(frame.sequence, 7);

    let Some(Inbound::Frame(next, _)) = codec.decode(&mut buf).unwrap() else {
        panic!("expected ping");
    };
    assert_eq!(next.decode_message::<PingMessage>().unwrap().seq, 8);
    assert_eq!(codec.stats().unknown_messages, 1);
}

#[test]
fn unknown_message_cannot_be_encoded() {
    let mut codec = FrameCodec::standard();
    let decoded = codec.decode_frame(&unknown_frame_bytes()).unwrap_err();
    let CodecError::UnknownMessage { frame, consumed } = decoded else {
        panic!("expected unknown message");
    };
    assert_eq!(consumed, unknown_frame_bytes().len());
    assert!(codec.encode_frame(&frame).is_err());
}

#[test]
fn oversized_payload_is_rejected() {
    let mut codec = FrameCodec::standard();
    let mut frame = Frame::from_message(EndpointIdentity::default(), &PingMessage::default());
    frame.payload = vec![1; 256];
    let err = codec.encode_frame(&frame).unwrap_err();
    assert!(matches!(err, CodecError::PayloadTooLarge { size: 256, max: 255 }));
}

#[test]
fn signature_verified_with_matching_key() {
    let bytes = signed_ping(1);
    let codec = codec_with(Some(SigningConfig::new(KEY_A, 0, false)), true);
    let decoded = codec.decode_frame(&bytes).unwrap();
    assert_eq!(decoded.signature, SignatureStatus::Verified);
    assert_eq!(decoded.frame.signature.unwrap().link_id, 3);
}

#[test]
fn signature_with_wrong_key_is_lenient_unless_strict() {
    let bytes = signed_ping(1);

    let lenient = codec_with(Some(SigningConfig::new(KEY_B, 0, false)), false);
    assert_eq!(
        lenient.decode_frame(&bytes).unwrap().signature,
        SignatureStatus::Unverified
    );

    let strict = codec_with(Some(SigningConfig::new(KEY_B, 0, false)), true);
    let err = strict.decode_frame(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::Signature { consumed, .. } if consumed == bytes.len()));
}

#[test]
fn signature_without_key() {
    let bytes = signed_ping(1);

    let lenient = codec_with(None, false);
    assert_eq!(
        lenient.decode_frame(&bytes).unwrap().signature,
        SignatureStatus::Unverified
    );

    let mut strict = codec_with(None, true);
    let mut buf = BytesMut::from(&bytes[..]);
    assert!(strict.decode(&mut buf).unwrap().is_none());
    assert!(buf.is_empty());
    assert_eq!(strict.stats().signature_rejections, 1);
}

#[test]
fn unsigned_frames_pass_strict_mode() {
    let mut sender = FrameCodec::standard();
    let bytes = sender.encode_message(EndpointIdentity::new(1, 1), &PingMessage::new(0, 1, 0, 0));
    let strict = codec_with(Some(SigningConfig::new(KEY_A, 0, false)), true);
    assert_eq!(
        strict.decode_frame(&bytes).unwrap().signature,
        SignatureStatus::Unsigned
    );
}

#[test]
fn signing_timestamps_increase() {
    let mut sender = codec_with(Some(SigningConfig::new(KEY_A, 1, true)), false);
    let reader = codec_with(Some(SigningConfig::new(KEY_A, 1, false)), true);

    let mut last = 0;
    for seq in 0..5 {
        let bytes = sender.encode_message(EndpointIdentity::new(1, 1), &PingMessage::new(0, seq, 0, 0));
        let signature = reader.decode_frame(&bytes).unwrap().frame.signature.unwrap();
        assert!(signature.timestamp > last);
        last = signature.timestamp;
    }
}

#[test]
fn crc_extra_is_part_of_the_checksum() {
    let mut codec = FrameCodec::standard();
    let bytes = codec.encode_message(EndpointIdentity::new(1, 1), &PingMessage::new(0, 1, 0, 0));
    let frame = codec.decode_frame(&bytes).unwrap().frame;
    let body = &bytes[1..bytes.len() - 2];
    assert_eq!(frame.checksum, checksum(body, PingMessage::CRC_EXTRA));
    assert_ne!(frame.checksum, checksum(body, PingMessage::CRC_EXTRA.wrapping_add(1)));
}
