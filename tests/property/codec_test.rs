// tests/property/codec_test.rs

//! Properties of the frame codec that must hold for any input: encoded
//! frames decode back to their envelope, and hostile bytes never panic.

use crate::fixtures;
use bytes::Bytes;
use guard_gateway::core::protocol::checksum::body_checksum;
use guard_gateway::core::protocol::{
    DecodedMessage, ProtocolVariant, ResponseFrame, decode_frame, decode_structure,
};
use proptest::prelude::*;

fn variant_strategy() -> impl Strategy<Value = ProtocolVariant> {
    prop_oneof![Just(ProtocolVariant::Legacy), Just(ProtocolVariant::New)]
}

/// Data that fits the length prefix of either variant.
fn frame_data() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=250)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_encoded_frame_decodes_to_same_envelope(
        variant in variant_strategy(),
        sequence in any::<i16>(),
        ack in any::<u8>(),
        data in frame_data(),
    ) {
        let frame = ResponseFrame {
            variant,
            sequence,
            ack,
            data: Bytes::from(data.clone()),
        };
        let encoded = frame.encode_to_bytes().unwrap();
        prop_assert_eq!(encoded.len(), variant.min_frame_len() + data.len());

        let decoded = decode_frame(encoded).unwrap();
        prop_assert_eq!(decoded.variant, variant);
        prop_assert_eq!(decoded.sequence, sequence);
        prop_assert_eq!(decoded.message_type, ack);
        prop_assert_eq!(&decoded.payload[..], &data[..]);
        prop_assert!(decoded.checksum_matches());
    }

    #[test]
    fn prop_variant_detection_matches_builder(
        variant in variant_strategy(),
        message_type in any::<u8>(),
        payload in frame_data(),
    ) {
        let frame = fixtures::frame(variant, 1, message_type, &payload);
        prop_assert_eq!(ProtocolVariant::detect(&frame), Some(variant));
    }

    #[test]
    fn prop_any_corrupted_body_byte_breaks_checksum(
        payload in prop::collection::vec(any::<u8>(), 1..200),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let frame = fixtures::legacy_frame(42, fixtures::HEARTBEAT, &payload);
        let mut corrupted = frame.clone();
        // Anything after the length prefix and the checksum itself.
        let at = 3 + index.index(frame.len() - 3);
        corrupted[at] ^= flip;

        let decoded = decode_frame(Bytes::from(corrupted)).unwrap();
        prop_assert!(!decoded.checksum_matches());
        prop_assert_eq!(decoded.checksum, body_checksum(&frame[1..]));
    }

    #[test]
    fn prop_decode_frame_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_frame(Bytes::from(bytes));
    }

    #[test]
    fn prop_decode_structure_never_panics(
        variant in variant_strategy(),
        message_type in prop_oneof![
            Just(0x02u8), Just(0x06), Just(0x0a), Just(0x0e), Just(0x32), Just(0xff), any::<u8>()
        ],
        payload in prop::collection::vec(any::<u8>(), 0..200),
    ) {
        let message = DecodedMessage {
            variant,
            sequence: 0,
            message_type,
            payload: Bytes::from(payload),
            checksum: 0,
            computed_checksum: 0,
        };
        let _ = decode_structure(&message);
    }
}
