//! Actions produced by the coordinator.
//!
//! The driver executes these in order: discovery and transport commands go to
//! the platform transport, [`LobbyAction::Notify`] goes to whoever observes the
//! lobby (UI, tests, the async handle).

use std::{fmt, time::Duration};

use bytes::Bytes;
use meshlobby_proto::DiscoveryInfo;

use crate::{
    discovery::DiscoveredPeer,
    event::DecisionId,
    identity::PeerIdentity,
    session::Reliability,
};

/// Discovery handle kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Announcing local presence
    Advertising,
    /// Observing other peers' announcements
    Browsing,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advertising => f.write_str("advertising"),
            Self::Browsing => f.write_str("browsing"),
        }
    }
}

/// Why a join attempt ended without lobby membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinFailure {
    /// No confirmation before the join deadline
    TimedOut,
    /// Connection dropped after it formed but before confirmation
    Disconnected,
    /// Local session was reset while the join was in flight
    Reset,
}

impl fmt::Display for JoinFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out"),
            Self::Disconnected => f.write_str("peer disconnected"),
            Self::Reset => f.write_str("session reset"),
        }
    }
}

/// Change notifications for lobby observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new peer entered the discovered set.
    PeerDiscovered {
        /// Discovered peer and its advertisement
        peer: DiscoveredPeer,
    },
    /// A peer left the discovered set.
    PeerLost {
        /// Lost peer
        peer: PeerIdentity,
    },
    /// A peer completed the join handshake and is now a lobby member.
    MemberJoined {
        /// New member
        peer: PeerIdentity,
    },
    /// A member's connection dropped. Membership is unchanged.
    MemberDisconnected {
        /// Disconnected member
        peer: PeerIdentity,
    },
    /// A member was removed after its connection dropped.
    MemberLeft {
        /// Removed member
        peer: PeerIdentity,
    },
    /// A join attempt ended without membership.
    JoinFailed {
        /// Peer we tried to join
        peer: PeerIdentity,
        /// Failure cause
        reason: JoinFailure,
    },
    /// Advertising or browsing failed to start. Retrying is allowed.
    ServiceFailed {
        /// Which handle failed
        service: Service,
        /// Transport-reported reason
        reason: String,
    },
    /// A peer sent something the protocol does not allow.
    ProtocolViolation {
        /// Offending peer
        peer: PeerIdentity,
        /// What was rejected
        reason: String,
    },
    /// The local identity was replaced by a reset.
    IdentityChanged {
        /// Identity before the reset
        previous: PeerIdentity,
        /// Identity after the reset
        current: PeerIdentity,
    },
}

/// Effects requested by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyAction {
    /// Begin advertising `identity` with `info`.
    StartAdvertising {
        /// Identity to announce
        identity: PeerIdentity,
        /// Service tag to announce under
        service_tag: String,
        /// Advertisement metadata
        info: DiscoveryInfo,
    },

    /// Stop advertising and release the advertiser.
    StopAdvertising,

    /// Begin browsing for `service_tag`.
    StartBrowsing {
        /// Identity browsing on behalf of
        identity: PeerIdentity,
        /// Service tag to browse for
        service_tag: String,
    },

    /// Stop browsing and release the browser.
    StopBrowsing,

    /// Invite a peer into the session. Fire-and-forget; the outcome arrives as
    /// connection state changes.
    Invite {
        /// Invitee
        peer: PeerIdentity,
        /// Encoded invitation context
        payload: Bytes,
        /// How long the transport should keep the invitation open
        timeout: Duration,
    },

    /// Answer an incoming invitation.
    RespondToInvitation {
        /// Decision callback to invoke
        decision: DecisionId,
        /// Accept or decline
        accept: bool,
    },

    /// Answer a certificate check.
    RespondToCertificate {
        /// Decision callback to invoke
        decision: DecisionId,
        /// Trust or reject
        accept: bool,
    },

    /// Deliver a message to connected peers.
    Send {
        /// Recipients, all currently connected
        peers: Vec<PeerIdentity>,
        /// Encoded message
        payload: Bytes,
        /// Delivery mode
        reliability: Reliability,
    },

    /// Drop the connection to one peer.
    CancelConnection {
        /// Peer to disconnect
        peer: PeerIdentity,
    },

    /// Disconnect everyone and detach event handlers from the session.
    CloseSession,

    /// Create a fresh session for `identity` and attach event handlers.
    OpenSession {
        /// Identity that owns the new session
        identity: PeerIdentity,
    },

    /// Report a change to lobby observers.
    Notify(Notification),
}
