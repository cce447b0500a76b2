//! Lobby handshake coordinator.
//!
//! Owns every piece of mutable peer state and serializes all inputs through
//! [`Coordinator::handle`].
//!
//! # Architecture: Action-Based State Machine
//!
//! - Inputs are [`LobbyEvent`]s: user commands, discovery callbacks, transport
//!   callbacks, invitation decisions and clock ticks
//! - Each input returns `Result<Vec<LobbyAction>, LobbyError>`
//! - Driver code executes the actions and feeds callbacks back in
//!
//! # Join handshake
//!
//! ```text
//! joiner:  Idle ──join──> InvitationRequestSent ──connected──> Connected(Join) ──accept──> LobbyJoined
//! host:    Idle ──request> InviteReceived ───────connected──> Connected(Accept) ──join──> LobbyJoined
//! ```
//!
//! 1. **Request**: the joiner invites the host with `InvitationRequest`. The host
//!    declines that invitation and invites the joiner back with `Invite`.
//! 2. **Commit**: the joiner accepts. When its session reports the host as
//!    connected, the stored [`PendingInvitation`] fires once and sends
//!    `JoinRequest`.
//! 3. **Accept**: the host adds the joiner to its lobby and replies
//!    `AcceptJoinRequest`.
//! 4. **Confirm**: the joiner adds the host to its lobby.
//!
//! The commit phase waits on the connected event for that specific peer,
//! bounded by `join_timeout`; there is no fixed settling delay.

mod handshake;
mod reset;

use std::{collections::BTreeMap, time::Instant};

use bytes::Bytes;
use meshlobby_proto::{InvitationContext, LobbyMessage, ProtocolError, WirePayload};
use tracing::{info, warn};

use crate::{
    action::{LobbyAction, Notification, Service},
    config::{CoordinatorConfig, OperatingMode},
    discovery::{DiscoveredPeer, Discovery},
    env::Environment,
    error::LobbyError,
    event::{DiscoveryEvent, LobbyEvent, TransportEvent},
    identity::{PeerId, PeerIdentity},
    lobby::LobbyState,
    session::TransportSession,
};

/// Deferred step run when a pending peer connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Send `JoinRequest` over the new connection
    SendJoinRequest,
}

/// A join attempt waiting for its target to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvitation {
    /// Peer we are joining
    pub peer: PeerIdentity,
    /// What to do once connected
    pub continuation: Continuation,
}

/// What a connected handshake is still waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStep {
    /// Joiner sent `JoinRequest`, awaiting `AcceptJoinRequest`
    Join,
    /// Host is connected, awaiting `JoinRequest`
    Accept,
}

/// Per-peer handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No handshake
    #[default]
    Idle,
    /// Joiner: invitation request sent, waiting for the host's counter-invite to connect
    InvitationRequestSent,
    /// Host: request declined, counter-invite sent
    InviteReceived,
    /// Connection formed, commit phase in progress
    Connected(PendingStep),
    /// Join/accept exchange completed
    LobbyJoined,
}

impl HandshakeState {
    /// Whether this is the joining side of an unfinished handshake.
    pub fn is_joining(self) -> bool {
        matches!(self, Self::InvitationRequestSent | Self::Connected(PendingStep::Join))
    }

    /// Whether this is the hosting side of an unfinished handshake.
    pub fn is_hosting(self) -> bool {
        matches!(self, Self::InviteReceived | Self::Connected(PendingStep::Accept))
    }
}

#[derive(Debug, Clone)]
struct Handshake {
    peer: PeerIdentity,
    state: HandshakeState,
    deadline: Option<Instant>,
}

impl Handshake {
    fn new(peer: PeerIdentity, state: HandshakeState, deadline: Option<Instant>) -> Self {
        Self { peer, state, deadline }
    }
}

/// Encoded handshake payloads, built once at construction.
#[derive(Debug, Clone)]
struct Payloads {
    invite: Bytes,
    invitation_request: Bytes,
    join_request: Bytes,
    accept_join_request: Bytes,
}

impl Payloads {
    fn encode() -> Result<Self, ProtocolError> {
        Ok(Self {
            invite: InvitationContext::Invite.encode()?,
            invitation_request: InvitationContext::InvitationRequest.encode()?,
            join_request: LobbyMessage::JoinRequest.encode()?,
            accept_join_request: LobbyMessage::AcceptJoinRequest.encode()?,
        })
    }
}

/// Immutable view of coordinator state for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    /// Local identity
    pub local: PeerIdentity,
    /// Current reset generation
    pub iteration: u64,
    /// Whether the advertiser is running
    pub advertising: bool,
    /// Whether the browser is running
    pub browsing: bool,
    /// Discovered peers, ordered by id
    pub discovered: Vec<DiscoveredPeer>,
    /// Lobby members, ordered by id
    pub members: Vec<PeerIdentity>,
    /// Peers we are currently trying to join
    pub joining: Vec<PeerIdentity>,
}

/// Single owner of discovery, session, handshake and lobby state.
#[derive(Debug)]
pub struct Coordinator<E: Environment> {
    env: E,
    config: CoordinatorConfig,
    payloads: Payloads,
    local: PeerIdentity,
    discovery: Discovery,
    session: TransportSession,
    lobby: LobbyState,
    pending: BTreeMap<PeerId, PendingInvitation>,
    handshakes: BTreeMap<PeerId, Handshake>,
}

impl<E: Environment> Coordinator<E> {
    /// Create a coordinator with a freshly generated identity.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `config` fails validation.
    pub fn new(env: E, config: CoordinatorConfig) -> Result<Self, LobbyError> {
        config.validate()?;
        let payloads = Payloads::encode()?;
        let local = PeerIdentity::generate(&env);

        Ok(Self {
            discovery: Discovery::new(config.service_tag.clone()),
            session: TransportSession::new(local.clone()),
            lobby: LobbyState::default(),
            pending: BTreeMap::new(),
            handshakes: BTreeMap::new(),
            local,
            payloads,
            config,
            env,
        })
    }

    /// Actions that attach the initial session. Run once before any event.
    pub fn start(&self) -> Vec<LobbyAction> {
        info!(peer = %self.local, service_tag = %self.config.service_tag, "created session");
        vec![LobbyAction::OpenSession { identity: self.local.clone() }]
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// - `Protocol` if an inbound message cannot be decoded
    /// - `Session` if a reply targets a peer the session does not consider
    ///   connected
    /// - `UnexpectedMessage` if a confirmation arrives with no join in flight
    pub fn handle(&mut self, event: LobbyEvent) -> Result<Vec<LobbyAction>, LobbyError> {
        match event {
            LobbyEvent::Host => Ok(self.host()),
            LobbyEvent::Advertise => Ok(self.advertise()),
            LobbyEvent::Browse => Ok(self.browse()),
            LobbyEvent::StopAdvertising => Ok(self.discovery.stop_advertising()),
            LobbyEvent::StopBrowsing => Ok(self.discovery.stop_browsing()),
            LobbyEvent::Join { peer } => self.join(peer),
            LobbyEvent::Leave => Ok(self.leave()),
            LobbyEvent::Reset => Ok(self.reset()),
            LobbyEvent::Discovery(event) => Ok(self.handle_discovery(event)),
            LobbyEvent::Transport(event) => self.handle_transport(event),
            LobbyEvent::Decision(event) => Ok(self.handle_decision(event)),
            LobbyEvent::Tick => Ok(self.tick()),
        }
    }

    /// Local identity.
    #[must_use]
    pub fn local(&self) -> &PeerIdentity {
        &self.local
    }

    /// Active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Discovery state.
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Transport session model.
    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    /// Lobby membership.
    pub fn lobby(&self) -> &LobbyState {
        &self.lobby
    }

    /// Whether any join attempt is waiting for its target to connect.
    pub fn is_joining(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Pending continuation for `peer`.
    pub fn pending_invitation(&self, peer: PeerId) -> Option<&PendingInvitation> {
        self.pending.get(&peer)
    }

    /// Handshake progress with `peer`.
    #[must_use]
    pub fn handshake_state(&self, peer: PeerId) -> HandshakeState {
        self.handshakes.get(&peer).map_or(HandshakeState::Idle, |h| h.state)
    }

    /// Copy of the observable state.
    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            local: self.local.clone(),
            iteration: self.discovery.iteration(),
            advertising: self.discovery.is_advertising(),
            browsing: self.discovery.is_browsing(),
            discovered: self.discovery.peers().cloned().collect(),
            members: self.lobby.members().cloned().collect(),
            joining: self
                .handshakes
                .values()
                .filter(|h| h.state.is_joining())
                .map(|h| h.peer.clone())
                .collect(),
        }
    }

    fn host(&mut self) -> Vec<LobbyAction> {
        let mut actions = self.discovery.advertise(&self.local, None);
        actions.extend(self.discovery.browse(&self.local));
        actions
    }

    fn advertise(&mut self) -> Vec<LobbyAction> {
        let mut actions = self.discovery.advertise(&self.local, None);
        if self.config.mode == OperatingMode::Paired {
            actions.extend(self.discovery.browse(&self.local));
        }
        actions
    }

    fn browse(&mut self) -> Vec<LobbyAction> {
        let mut actions = self.discovery.browse(&self.local);
        if self.config.mode == OperatingMode::Paired {
            actions.extend(self.discovery.advertise(&self.local, None));
        }
        actions
    }

    fn handle_discovery(&mut self, event: DiscoveryEvent) -> Vec<LobbyAction> {
        match event {
            DiscoveryEvent::PeerFound { identity, info } => {
                self.discovery.peer_found(&self.local, identity, info)
            },
            DiscoveryEvent::PeerLost { identity } => self.discovery.peer_lost(&identity),
            DiscoveryEvent::AdvertisingFailed { reason } => {
                self.discovery.start_failed(Service::Advertising, reason)
            },
            DiscoveryEvent::BrowsingFailed { reason } => {
                self.discovery.start_failed(Service::Browsing, reason)
            },
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Result<Vec<LobbyAction>, LobbyError> {
        match event {
            TransportEvent::StateChanged { peer, state } => self.on_state_changed(peer, state),
            TransportEvent::MessageReceived { from, payload } => self.on_message(from, &payload),
            TransportEvent::StreamReceived { from, name } => {
                Ok(self.reject_unsupported(from, "stream", &name))
            },
            TransportEvent::ResourceReceived { from, name } => {
                Ok(self.reject_unsupported(from, "resource", &name))
            },
        }
    }

    /// Streams and resources are outside the protocol; the sender is cut off.
    fn reject_unsupported(
        &mut self,
        from: PeerIdentity,
        kind: &str,
        name: &str,
    ) -> Vec<LobbyAction> {
        warn!(peer = %from, kind, name, "rejecting unsupported transfer");
        vec![
            self.session.cancel(&from),
            LobbyAction::Notify(Notification::ProtocolViolation {
                peer: from,
                reason: format!("{kind} transfer {name:?} is not supported"),
            }),
        ]
    }
}
