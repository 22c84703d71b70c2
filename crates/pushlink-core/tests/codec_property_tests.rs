//! Property-based tests for the multipart codec and peer input validation
//!
//! Everything here is fed bytes an untrusted phone could send, so the
//! properties are about never panicking and never accepting garbage.

use proptest::prelude::*;
use pushlink_core::message::{NotificationMessage, PairingRequest};
use pushlink_core::types::PeerIdentifier;
use pushlink_core::wire::{chunk_unit, decode_parts, encode_parts, UnitAssembler, MAX_CHUNK};

/// Parts of arbitrary content, including empty ones
fn arb_parts() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..6)
}

proptest! {
    /// Property: decoding arbitrary bytes returns instead of panicking
    #[test]
    fn decode_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_parts(&bytes);
    }

    /// Property: a well-formed unit survives chunking and reassembly intact
    #[test]
    fn chunked_unit_reassembles(parts in arb_parts(), padding in 0usize..(2 * MAX_CHUNK)) {
        let mut parts = parts;
        parts.push(vec![0xAB; padding]);
        let unit = encode_parts(&parts);

        let mut assembler = UnitAssembler::new(usize::MAX);
        let mut finished = None;
        for chunk in chunk_unit(&unit) {
            prop_assert!(finished.is_none());
            finished = assembler.push(&chunk).unwrap();
        }

        prop_assert_eq!(decode_parts(&finished.unwrap()).unwrap(), parts);
    }

    /// Property: only 2 or 3 part units become notifications
    #[test]
    fn notification_arity_is_enforced(parts in arb_parts()) {
        let count = parts.len();
        let all_utf8 = parts.iter().take(2).all(|p| std::str::from_utf8(p).is_ok());
        let result = NotificationMessage::from_parts(parts);

        prop_assert_eq!(result.is_ok(), (count == 2 || count == 3) && all_utf8);
    }

    /// Property: an accepted identifier is always a single plain file name
    #[test]
    fn identifier_never_escapes_directory(raw in "\\PC{0,40}") {
        if let Ok(identifier) = PeerIdentifier::new(raw.clone()) {
            let name = identifier.as_str();
            prop_assert!(!name.contains('/'));
            prop_assert!(!name.contains('\\'));
            prop_assert!(name != "." && name != "..");
            prop_assert!(!name.is_empty());
        }
    }

    /// Property: pairing requests with non-hex keys are rejected
    #[test]
    fn pairing_request_requires_hex_key(key in "[g-z]{1,64}") {
        let parts = vec![b"phone".to_vec(), key.into_bytes()];
        prop_assert!(PairingRequest::from_parts(parts).is_err());
    }
}
