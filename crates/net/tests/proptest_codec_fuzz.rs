//! Fuzz-style property tests for the envelope codec
//!
//! These tests validate that the frame decoder handles arbitrary
//! network input gracefully without crashing.

use gridtown_core::{ActionId, BuildingKind, Millis, PlayerId};
use gridtown_net::{decode, encode, MessageFactory, FRAME_MAGIC};
use proptest::prelude::*;

fn factory() -> MessageFactory {
    MessageFactory::new("fuzz")
}

proptest! {
    /// Property: Arbitrary bytes don't crash the decoder
    #[test]
    fn arbitrary_bytes_dont_crash(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = decode(&random_bytes);
        // No panic = success
    }

    /// Property: Arbitrary bytes behind a valid magic don't crash
    #[test]
    fn arbitrary_payload_behind_magic_handled(
        random_bytes in prop::collection::vec(any::<u8>(), 0..500),
    ) {
        let mut frame = Vec::new();
        frame.extend_from_slice(FRAME_MAGIC);
        frame.extend_from_slice(&(random_bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(&random_bytes);

        let _result = decode(&frame);
        // Should fail gracefully, not panic
    }

    /// Property: Chat envelopes roundtrip for any text under the limit
    #[test]
    fn chat_roundtrips(text in "[ -~]{0,200}") {
        let env = factory().chat(PlayerId::new("alice"), text);
        let encoded = encode(&env).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(env, decoded);
    }

    /// Property: Place-building envelopes roundtrip for any coordinates
    #[test]
    fn place_building_roundtrips(
        action in any::<u64>(),
        row in any::<u16>(),
        col in any::<u16>(),
        issued in 1u64..u64::MAX,
    ) {
        let env = factory().place_building(
            ActionId(action),
            PlayerId::new("bob"),
            row,
            col,
            BuildingKind::Road,
            Millis(issued),
        );
        let encoded = encode(&env).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(env, decoded);
    }

    /// Property: Action responses roundtrip
    #[test]
    fn action_response_roundtrips(
        action in any::<u64>(),
        accepted in any::<bool>(),
    ) {
        let env = factory().action_response(
            ActionId(action),
            accepted,
            if accepted { None } else { Some("Cell occupied".to_string()) },
        );
        let encoded = encode(&env).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(env, decoded);
    }

    /// Property: Truncated frames don't crash
    #[test]
    fn truncated_frames_handled(truncate_at in 0usize..80) {
        let env = factory().ping(Millis(12345));
        let mut encoded = encode(&env).unwrap();

        if truncate_at < encoded.len() {
            encoded.truncate(truncate_at);
            let _result = decode(&encoded);
            // May fail or succeed - just shouldn't panic
        }
    }

    /// Property: Oversized length prefix handled
    #[test]
    fn oversized_length_handled(claimed_length in 100u32..5000u32) {
        let mut frame = Vec::new();
        frame.extend_from_slice(FRAME_MAGIC);
        frame.extend_from_slice(&claimed_length.to_le_bytes());
        frame.extend_from_slice(&[0, 1, 2, 3, 4]);

        let _result = decode(&frame);
        // Should fail gracefully, not panic
    }

    /// Property: Corrupted payload handled
    #[test]
    fn corrupted_payload_handled(
        flip_pos in 0usize..60,
        flip_bit in 0u8..8,
    ) {
        let env = factory().ping(Millis(999));
        let mut encoded = encode(&env).unwrap();

        if flip_pos + 8 < encoded.len() {
            encoded[flip_pos + 8] ^= 1 << flip_bit;
            let _result = decode(&encoded);
            // May succeed or fail - just shouldn't panic
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn empty_frame_fails() {
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn too_short_fails() {
        assert!(decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn valid_roundtrip() {
        let env = factory().ping(Millis(1));
        let encoded = encode(&env).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(env, decoded);
    }
}
