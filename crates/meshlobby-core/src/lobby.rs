//! Lobby membership.

use std::collections::BTreeMap;

use crate::identity::{PeerId, PeerIdentity};

/// Peers that completed the join handshake with us.
///
/// Only the coordinator mutates membership.
#[derive(Debug, Clone, Default)]
pub struct LobbyState {
    members: BTreeMap<PeerId, PeerIdentity>,
}

impl LobbyState {
    /// Whether `peer` is a member.
    pub fn contains(&self, peer: PeerId) -> bool {
        self.members.contains_key(&peer)
    }

    /// Members ordered by id.
    pub fn members(&self) -> impl Iterator<Item = &PeerIdentity> {
        self.members.values()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the lobby is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a member. Returns `false` if already present.
    pub(crate) fn insert(&mut self, peer: PeerIdentity) -> bool {
        if self.members.contains_key(&peer.id()) {
            return false;
        }
        self.members.insert(peer.id(), peer);
        true
    }

    pub(crate) fn remove(&mut self, peer: PeerId) -> Option<PeerIdentity> {
        self.members.remove(&peer)
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }
}
