//! Wire format for the meshlobby handshake.
//!
//! Two closed enumerations travel between peers. [`InvitationContext`] rides
//! inside a transport invitation as its opaque context. [`LobbyMessage`] is
//! sent as an application message once a connection exists. Both are encoded
//! as CBOR text strings, so a payload is self-describing and a receiver can
//! reject anything it does not recognise without guessing at layout.
//!
//! Advertisements carry a [`DiscoveryInfo`] string map alongside the peer
//! identity.
//!
//! # Security
//!
//! Payloads come from arbitrary nearby peers. Decoding never panics, enforces
//! a [`MAX_PAYLOAD_SIZE`] limit and rejects trailing bytes.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod discovery;
pub mod errors;
pub mod payloads;

pub use discovery::DiscoveryInfo;
pub use errors::{ProtocolError, Result};
pub use payloads::{InvitationContext, LobbyMessage, MAX_PAYLOAD_SIZE, WirePayload};
