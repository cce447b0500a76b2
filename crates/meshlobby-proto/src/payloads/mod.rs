//! Handshake payload types.
//!
//! # Protocol Flow
//!
//! ```text
//! joiner                                   host
//!   │── invite(InvitationRequest) ─────────>│  declined
//!   │<──────────────── invite(Invite) ──────│  accepted, connection forms
//!   │── send(JoinRequest) ─────────────────>│  host adds joiner
//!   │<────────────── send(AcceptJoinRequest)│  joiner adds host
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Upper bound on any encoded handshake payload.
///
/// Every valid payload is a short text string, so anything near this size is
/// already hostile.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Context attached to a transport-level invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvitationContext {
    /// Host-issued invitation. The receiver accepts and the connection forms.
    Invite,
    /// Sent by a would-be joiner. The receiver declines and counter-invites.
    InvitationRequest,
}

/// Application message exchanged over an established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LobbyMessage {
    /// Joiner asks to enter the host's lobby.
    JoinRequest,
    /// Host confirms the joiner is now a lobby member.
    AcceptJoinRequest,
}

/// CBOR encoding shared by all wire payloads.
pub trait WirePayload: Serialize + DeserializeOwned {
    /// Encode to CBOR bytes.
    fn encode(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode from CBOR bytes.
    ///
    /// Rejects empty input, oversized input, unknown variants and trailing
    /// bytes.
    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ProtocolError::Empty);
        }

        if bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut reader = bytes;
        let value = ciborium::de::from_reader(&mut reader)
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;

        if !reader.is_empty() {
            return Err(ProtocolError::TrailingBytes { count: reader.len() });
        }

        Ok(value)
    }
}

impl WirePayload for InvitationContext {}
impl WirePayload for LobbyMessage {}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn invitation_context_encodes_as_tagged_text() {
        let invite = InvitationContext::Invite.encode().unwrap();
        assert_eq!(&invite[..], &hex!("66 696e76697465")[..]);

        let request = InvitationContext::InvitationRequest.encode().unwrap();
        assert_eq!(&request[..], &hex!("71 696e7669746174696f6e52657175657374")[..]);
    }

    #[test]
    fn lobby_message_encodes_as_tagged_text() {
        let join = LobbyMessage::JoinRequest.encode().unwrap();
        assert_eq!(&join[..], &hex!("6b 6a6f696e52657175657374")[..]);
    }

    #[test]
    fn decode_known_variants() {
        let bytes = LobbyMessage::AcceptJoinRequest.encode().unwrap();
        assert_eq!(LobbyMessage::decode(&bytes).unwrap(), LobbyMessage::AcceptJoinRequest);

        let bytes = InvitationContext::InvitationRequest.encode().unwrap();
        assert_eq!(
            InvitationContext::decode(&bytes).unwrap(),
            InvitationContext::InvitationRequest
        );
    }

    #[test]
    fn decode_rejects_other_enumeration() {
        // A lobby message is not a valid invitation context
        let bytes = LobbyMessage::JoinRequest.encode().unwrap();
        assert!(matches!(InvitationContext::decode(&bytes), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn decode_rejects_empty() {
        assert_eq!(LobbyMessage::decode(&[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn decode_rejects_oversized() {
        let bytes = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            LobbyMessage::decode(&bytes),
            Err(ProtocolError::PayloadTooLarge { size, .. }) if size == MAX_PAYLOAD_SIZE + 1
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = InvitationContext::Invite.encode().unwrap().to_vec();
        bytes.extend_from_slice(&[0x00, 0x01]);
        assert_eq!(
            InvitationContext::decode(&bytes),
            Err(ProtocolError::TrailingBytes { count: 2 })
        );
    }

    #[test]
    fn decode_rejects_truncated() {
        let bytes = InvitationContext::InvitationRequest.encode().unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(InvitationContext::decode(truncated), Err(ProtocolError::Decode(_))));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = InvitationContext::decode(&bytes);
            let _ = LobbyMessage::decode(&bytes);
        }
    }
}
