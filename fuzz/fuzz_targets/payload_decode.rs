//! Fuzz target for wire payload decoding.
//!
//! Arbitrary bytes must decode to a known variant or a typed error, never a
//! panic. Anything that decodes must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshlobby_proto::{InvitationContext, LobbyMessage, MAX_PAYLOAD_SIZE, WirePayload};

fuzz_target!(|data: &[u8]| {
    if let Ok(context) = InvitationContext::decode(data) {
        let encoded = context.encode().expect("decoded context re-encodes");
        assert_eq!(InvitationContext::decode(&encoded).ok(), Some(context));
    }

    if let Ok(message) = LobbyMessage::decode(data) {
        let encoded = message.encode().expect("decoded message re-encodes");
        assert_eq!(LobbyMessage::decode(&encoded).ok(), Some(message));
    }

    if data.len() > MAX_PAYLOAD_SIZE {
        assert!(InvitationContext::decode(data).is_err());
        assert!(LobbyMessage::decode(data).is_err());
    }
});
