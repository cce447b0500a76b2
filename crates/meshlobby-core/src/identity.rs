//! Peer identity.
//!
//! A [`PeerIdentity`] is what the transport uses to address a peer: an opaque
//! 128-bit token plus a human-readable label. Identities are never mutated; a
//! session reset throws the old one away and generates a fresh one.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use crate::env::Environment;

/// Opaque, comparable peer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u128);

impl PeerId {
    /// Wrap a raw token.
    pub const fn from_u128(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw token.
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// Draw a fresh token from the environment RNG.
    pub fn random(env: &impl Environment) -> Self {
        let mut bytes = [0u8; 16];
        env.random_bytes(&mut bytes);
        Self(u128::from_be_bytes(bytes))
    }
}

/// Renders as a hyphenated 8-4-4-4-12 hex string.
impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

/// Transport-level peer handle.
///
/// Equality, ordering and hashing use only the [`PeerId`]. Two identities
/// that share a label but not an id are different peers.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    id: PeerId,
    label: String,
}

impl PeerIdentity {
    /// Identity with an explicit label.
    pub fn new(id: PeerId, label: impl Into<String>) -> Self {
        Self { id, label: label.into() }
    }

    /// Fresh identity labelled with its own token.
    pub fn generate(env: &impl Environment) -> Self {
        let id = PeerId::random(env);
        Self { id, label: id.to_string() }
    }

    /// Token.
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for PeerIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeerIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
