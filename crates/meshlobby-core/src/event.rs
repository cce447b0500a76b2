//! Events consumed by the coordinator.
//!
//! The platform transport reports through three separate interfaces:
//! discovery, transport and invitation decisions. Each one is a separate enum,
//! so a driver can wire them from separate callback sources. They are merged
//! into [`LobbyEvent`] together with user commands and clock ticks.

use bytes::Bytes;
use meshlobby_proto::DiscoveryInfo;

use crate::{
    identity::{PeerId, PeerIdentity},
    session::ConnectionState,
};

/// Handle for an accept/decline callback held by the driver.
///
/// The coordinator answers every decision event with exactly one response
/// action carrying the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecisionId(pub u64);

/// Advertiser and browser callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Browser observed an advertisement.
    PeerFound {
        /// Advertised identity
        identity: PeerIdentity,
        /// Advertisement metadata
        info: DiscoveryInfo,
    },
    /// Browser observed an advertisement disappear.
    PeerLost {
        /// Identity that stopped advertising
        identity: PeerIdentity,
    },
    /// Advertiser failed to start.
    AdvertisingFailed {
        /// Transport-reported reason
        reason: String,
    },
    /// Browser failed to start.
    BrowsingFailed {
        /// Transport-reported reason
        reason: String,
    },
}

/// Session callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer's connection state changed.
    StateChanged {
        /// Remote peer
        peer: PeerIdentity,
        /// New state
        state: ConnectionState,
    },
    /// A message arrived.
    MessageReceived {
        /// Sender
        from: PeerIdentity,
        /// Raw payload
        payload: Bytes,
    },
    /// A peer opened a byte stream. Not supported.
    StreamReceived {
        /// Sender
        from: PeerIdentity,
        /// Stream name
        name: String,
    },
    /// A peer started a resource transfer. Not supported.
    ResourceReceived {
        /// Sender
        from: PeerIdentity,
        /// Resource name
        name: String,
    },
}

/// Callbacks that must be answered with an accept/decline decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionEvent {
    /// A peer invited us into its session.
    InvitationReceived {
        /// Callback to answer
        decision: DecisionId,
        /// Inviter
        from: PeerIdentity,
        /// Raw invitation context
        context: Bytes,
    },
    /// A peer presented a certificate during connection setup.
    CertificateReceived {
        /// Callback to answer
        decision: DecisionId,
        /// Presenting peer
        from: PeerIdentity,
    },
}

/// Everything the coordinator reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    /// Start advertising and browsing.
    Host,
    /// Start advertising (and browsing, in paired mode).
    Advertise,
    /// Start browsing (and advertising, in paired mode).
    Browse,
    /// Stop advertising.
    StopAdvertising,
    /// Stop browsing.
    StopBrowsing,
    /// Join a discovered peer's lobby.
    Join {
        /// Target peer
        peer: PeerId,
    },
    /// Leave the lobby. Resets the session.
    Leave,
    /// Tear down and recreate identity, session and discovery.
    Reset,
    /// Discovery callback.
    Discovery(DiscoveryEvent),
    /// Transport callback.
    Transport(TransportEvent),
    /// Decision callback.
    Decision(DecisionEvent),
    /// Periodic clock tick for deadline checks.
    Tick,
}

impl From<DiscoveryEvent> for LobbyEvent {
    fn from(event: DiscoveryEvent) -> Self {
        Self::Discovery(event)
    }
}

impl From<TransportEvent> for LobbyEvent {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

impl From<DecisionEvent> for LobbyEvent {
    fn from(event: DecisionEvent) -> Self {
        Self::Decision(event)
    }
}
