//! Error types.

use meshlobby_proto::{LobbyMessage, ProtocolError};
use thiserror::Error;

use crate::{action::JoinFailure, identity::PeerIdentity};

/// Transport session precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A send targeted a peer that is not currently connected.
    #[error("peer {peer} is not connected")]
    PeerNotConnected {
        /// First unconnected target
        peer: PeerIdentity,
    },

    /// A send had no targets.
    #[error("send requires at least one recipient")]
    NoRecipients,
}

/// Invalid coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Service tag does not meet the transport's naming rules.
    #[error("invalid service tag {tag:?}: {reason}")]
    InvalidServiceTag {
        /// Rejected tag
        tag: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// A timeout was configured as zero.
    #[error("{field} must be non-zero")]
    ZeroTimeout {
        /// Name of the offending field
        field: &'static str,
    },
}

/// Errors surfaced by the lobby coordinator and runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// Payload could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport session precondition failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration rejected at construction.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A well-formed message arrived when the handshake was not expecting it.
    #[error("unexpected {message:?} from {peer}")]
    UnexpectedMessage {
        /// Sender
        peer: PeerIdentity,
        /// Message received
        message: LobbyMessage,
    },

    /// The join attempt exceeded its deadline.
    #[error("join with {peer} timed out")]
    JoinTimedOut {
        /// Peer we tried to join
        peer: PeerIdentity,
    },

    /// The join attempt was abandoned before confirmation.
    #[error("join with {peer} aborted: {reason}")]
    JoinAborted {
        /// Peer we tried to join
        peer: PeerIdentity,
        /// Why it was abandoned
        reason: JoinFailure,
    },

    /// The peer is not in the discovered set.
    #[error("peer is not discovered")]
    UnknownPeer,

    /// The lobby runtime is no longer running.
    #[error("lobby runtime has shut down")]
    ShutDown,
}

impl LobbyError {
    /// Map a failed join notification to the error reported to its caller.
    pub fn join_failed(peer: PeerIdentity, reason: JoinFailure) -> Self {
        match reason {
            JoinFailure::TimedOut => Self::JoinTimedOut { peer },
            reason => Self::JoinAborted { peer, reason },
        }
    }
}
