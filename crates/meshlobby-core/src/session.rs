//! Transport session model.
//!
//! Mirrors the platform session's view of each remote peer and turns
//! invitations and sends into [`LobbyAction`]s. Connection state is only ever
//! advanced by state-change events from the transport; issuing an invitation
//! moves a peer to `Connecting` locally but never to `Connected`.
//!
//! # Lifecycle
//!
//! A session belongs to exactly one local identity. Resetting closes it and
//! creates a replacement for the new identity, so nothing keyed by the old
//! identity survives.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use tracing::debug;

use crate::{
    action::LobbyAction,
    error::SessionError,
    identity::{PeerId, PeerIdentity},
};

/// Per-peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection
    #[default]
    NotConnected,
    /// Invitation outstanding or connection being negotiated
    Connecting,
    /// Connected; messages can be exchanged
    Connected,
}

/// Message delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reliability {
    /// Ordered, retransmitted delivery
    #[default]
    Reliable,
    /// Best effort
    Unreliable,
}

/// Multi-peer session owned by one local identity.
#[derive(Debug, Clone)]
pub struct TransportSession {
    local: PeerIdentity,
    peers: BTreeMap<PeerId, (PeerIdentity, ConnectionState)>,
}

impl TransportSession {
    /// Create an empty session for `local`.
    pub fn new(local: PeerIdentity) -> Self {
        Self { local, peers: BTreeMap::new() }
    }

    /// Identity that owns this session.
    #[must_use]
    pub fn local(&self) -> &PeerIdentity {
        &self.local
    }

    /// Current state of `peer`.
    #[must_use]
    pub fn state(&self, peer: PeerId) -> ConnectionState {
        self.peers.get(&peer).map_or(ConnectionState::NotConnected, |(_, state)| *state)
    }

    /// Peers currently connected.
    pub fn connected_peers(&self) -> impl Iterator<Item = &PeerIdentity> {
        self.peers
            .values()
            .filter(|(_, state)| *state == ConnectionState::Connected)
            .map(|(identity, _)| identity)
    }

    /// Invite `peer`, carrying an opaque `payload`.
    ///
    /// Does not wait for the outcome. A peer that is not yet connected is
    /// marked `Connecting`.
    pub fn invite(&mut self, peer: &PeerIdentity, payload: Bytes, timeout: Duration) -> LobbyAction {
        let entry = self
            .peers
            .entry(peer.id())
            .or_insert_with(|| (peer.clone(), ConnectionState::NotConnected));
        if entry.1 == ConnectionState::NotConnected {
            entry.1 = ConnectionState::Connecting;
        }

        LobbyAction::Invite { peer: peer.clone(), payload, timeout }
    }

    /// Send `payload` to every peer in `to`.
    ///
    /// # Errors
    ///
    /// - `NoRecipients` if `to` is empty
    /// - `PeerNotConnected` if any target is not connected
    pub fn send(
        &self,
        payload: Bytes,
        to: &[PeerIdentity],
        reliability: Reliability,
    ) -> Result<LobbyAction, SessionError> {
        if to.is_empty() {
            return Err(SessionError::NoRecipients);
        }

        if let Some(peer) = to.iter().find(|p| self.state(p.id()) != ConnectionState::Connected) {
            return Err(SessionError::PeerNotConnected { peer: peer.clone() });
        }

        Ok(LobbyAction::Send { peers: to.to_vec(), payload, reliability })
    }

    /// Record a state change reported by the transport.
    ///
    /// Returns the previous state.
    pub fn state_changed(&mut self, peer: &PeerIdentity, state: ConnectionState) -> ConnectionState {
        let previous = if state == ConnectionState::NotConnected {
            self.peers.remove(&peer.id()).map(|(_, s)| s)
        } else {
            self.peers.insert(peer.id(), (peer.clone(), state)).map(|(_, s)| s)
        };

        previous.unwrap_or_default()
    }

    /// Drop the connection to `peer`.
    pub fn cancel(&mut self, peer: &PeerIdentity) -> LobbyAction {
        self.peers.remove(&peer.id());
        LobbyAction::CancelConnection { peer: peer.clone() }
    }

    /// Disconnect everyone and release the session.
    pub fn close(self) -> LobbyAction {
        debug!(peer = %self.local, peers = self.peers.len(), "closing session");
        LobbyAction::CloseSession
    }

    /// Certificate check for a connecting peer.
    ///
    /// Trusts every peer. No identity verification is performed; any nearby
    /// device can join under any label.
    pub fn verify_certificate(&self, _peer: &PeerIdentity) -> bool {
        true
    }
}
