//! meshlobby core logic
//!
//! Pure state machines for peer discovery and lobby formation over a local
//! mesh transport, completely decoupled from I/O.
//!
//! # Architecture
//!
//! Everything a peer knows (discovered peers, per-peer connection state,
//! pending join continuations, lobby membership) is owned by a single
//! [`Coordinator`]. Inputs arrive as [`LobbyEvent`]s from three independent
//! sources (discovery, transport, invitation decisions) plus user commands.
//! Each input produces a list of [`LobbyAction`]s describing intended effects.
//! A driver executes those effects against the real transport and feeds the
//! resulting callbacks back in as events.
//!
//! Time and randomness come from an [`Environment`], so the same code runs in
//! production, unit tests and the deterministic simulation harness.
//!
//! # Components
//!
//! - [`identity`]: Peer identity tokens and labels
//! - [`discovery`]: Advertising/browsing state and the discovered-peer set
//! - [`session`]: Per-peer connection state and transport commands
//! - [`lobby`]: Confirmed lobby membership
//! - [`coordinator`]: Two-phase join handshake and session reset
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`error`]: Session, lobby and configuration errors

pub mod action;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod env;
pub mod error;
pub mod event;
pub mod identity;
pub mod lobby;
pub mod session;

pub use action::{JoinFailure, LobbyAction, Notification, Service};
pub use config::{CoordinatorConfig, OperatingMode};
pub use coordinator::{
    Continuation, Coordinator, HandshakeState, LobbySnapshot, PendingInvitation, PendingStep,
};
pub use discovery::{DiscoveredPeer, Discovery, ServiceState};
pub use env::{Environment, SystemEnv};
pub use error::{ConfigError, LobbyError, SessionError};
pub use event::{DecisionEvent, DecisionId, DiscoveryEvent, LobbyEvent, TransportEvent};
pub use identity::{PeerId, PeerIdentity};
pub use lobby::LobbyState;
pub use session::{ConnectionState, Reliability, TransportSession};
