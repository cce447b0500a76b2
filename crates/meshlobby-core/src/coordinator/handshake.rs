//! Join handshake transitions.

use std::slice;

use bytes::Bytes;
use meshlobby_proto::{InvitationContext, LobbyMessage, WirePayload};
use tracing::{debug, info, warn};

use super::{Continuation, Coordinator, Handshake, HandshakeState, PendingInvitation, PendingStep};
use crate::{
    action::{JoinFailure, LobbyAction, Notification},
    discovery::DiscoveredPeer,
    env::Environment,
    error::LobbyError,
    event::{DecisionEvent, DecisionId},
    identity::{PeerId, PeerIdentity},
    session::{ConnectionState, Reliability},
};

impl<E: Environment> Coordinator<E> {
    /// Start joining `peer`. No-op for undiscovered peers and members, and for
    /// a peer whose own join we are already hosting.
    pub(super) fn join(&mut self, peer: PeerId) -> Result<Vec<LobbyAction>, LobbyError> {
        let Some(DiscoveredPeer { identity: target, info }) = self.discovery.get(peer).cloned()
        else {
            debug!(%peer, "join ignored: peer not discovered");
            return Ok(Vec::new());
        };

        if self.lobby.contains(peer) {
            debug!(peer = %target, "join ignored: already a member");
            return Ok(Vec::new());
        }

        // The peer is already joining us; its request completes the lobby
        if self.handshake_state(peer).is_hosting() {
            debug!(peer = %target, "join ignored: already hosting");
            return Ok(Vec::new());
        }

        if self.pending.remove(&peer).is_some() {
            debug!(peer = %target, "replacing pending invitation");
        }

        let deadline = self.env.now() + self.config.join_timeout;

        let (action, state) = if self.session.state(peer) == ConnectionState::Connected {
            // No connected event will follow, so commit straight away
            let send = self.send_to(&target, self.payloads.join_request.clone())?;
            (send, HandshakeState::Connected(PendingStep::Join))
        } else {
            let invite = self.session.invite(
                &target,
                self.payloads.invitation_request.clone(),
                self.config.invite_timeout,
            );
            let continuation = Continuation::SendJoinRequest;
            self.pending.insert(peer, PendingInvitation { peer: target.clone(), continuation });
            (invite, HandshakeState::InvitationRequestSent)
        };

        info!(peer = %target, ?state, "joining");
        self.handshakes.insert(peer, Handshake::new(target, state, Some(deadline)));

        let mut actions = self.discovery.advertise(&self.local, Some(info));
        actions.push(action);
        Ok(actions)
    }

    /// Answer an invitation or certificate callback. Always returns exactly
    /// one response for the decision.
    pub(super) fn handle_decision(&mut self, event: DecisionEvent) -> Vec<LobbyAction> {
        match event {
            DecisionEvent::CertificateReceived { decision, from } => {
                let accept = self.session.verify_certificate(&from);
                debug!(peer = %from, accept, "certificate check");
                vec![LobbyAction::RespondToCertificate { decision, accept }]
            },
            DecisionEvent::InvitationReceived { decision, from, context } => {
                match InvitationContext::decode(&context) {
                    Ok(InvitationContext::Invite) => {
                        debug!(peer = %from, "accepting invite");
                        vec![LobbyAction::RespondToInvitation { decision, accept: true }]
                    },
                    Ok(InvitationContext::InvitationRequest) => {
                        self.answer_invitation_request(decision, from)
                    },
                    Err(e) => {
                        warn!(peer = %from, error = %e, "declining undecodable invitation");
                        vec![
                            LobbyAction::RespondToInvitation { decision, accept: false },
                            LobbyAction::Notify(Notification::ProtocolViolation {
                                peer: from,
                                reason: format!("invalid invitation context: {e}"),
                            }),
                        ]
                    },
                }
            },
        }
    }

    /// Decline the invitation request and invite the would-be joiner back as host.
    ///
    /// If we are simultaneously joining the same peer, the lower id hosts. A
    /// request from a peer we are already connected to or share a lobby with is
    /// only declined.
    fn answer_invitation_request(
        &mut self,
        decision: DecisionId,
        from: PeerIdentity,
    ) -> Vec<LobbyAction> {
        let mut actions = vec![LobbyAction::RespondToInvitation { decision, accept: false }];
        let id = from.id();

        let state = self.handshake_state(id);
        if matches!(state, HandshakeState::Connected(_) | HandshakeState::LobbyJoined)
            || self.lobby.contains(id)
        {
            debug!(peer = %from, ?state, "declined stale invitation request");
            return actions;
        }

        if self.pending.contains_key(&id) {
            if self.local.id() > id {
                debug!(peer = %from, "crossing join: peer hosts");
                return actions;
            }
            self.pending.remove(&id);
            debug!(peer = %from, "crossing join: hosting");
        }

        actions.push(self.session.invite(
            &from,
            self.payloads.invite.clone(),
            self.config.invite_timeout,
        ));
        info!(peer = %from, "declined invitation request, sent invite");

        let deadline = self.env.now() + self.config.invite_timeout;
        self.handshakes
            .insert(id, Handshake::new(from, HandshakeState::InviteReceived, Some(deadline)));

        actions
    }

    pub(super) fn on_state_changed(
        &mut self,
        peer: PeerIdentity,
        state: ConnectionState,
    ) -> Result<Vec<LobbyAction>, LobbyError> {
        let previous = self.session.state_changed(&peer, state);
        debug!(peer = %peer, ?previous, ?state, "connection state changed");

        match state {
            ConnectionState::Connected => self.on_connected(&peer),
            ConnectionState::NotConnected => Ok(self.on_disconnected(&peer)),
            ConnectionState::Connecting => Ok(Vec::new()),
        }
    }

    fn on_connected(&mut self, peer: &PeerIdentity) -> Result<Vec<LobbyAction>, LobbyError> {
        let id = peer.id();

        // Only a join attempt aimed at this very peer may fire
        if let Some(pending) = self.pending.remove(&id) {
            return self.fire(pending);
        }

        let accept_deadline = self.env.now() + self.config.join_timeout;
        if let Some(handshake) = self.handshakes.get_mut(&id)
            && handshake.state == HandshakeState::InviteReceived
        {
            handshake.state = HandshakeState::Connected(PendingStep::Accept);
            handshake.deadline = Some(accept_deadline);
        }

        Ok(Vec::new())
    }

    fn fire(&mut self, pending: PendingInvitation) -> Result<Vec<LobbyAction>, LobbyError> {
        match pending.continuation {
            Continuation::SendJoinRequest => {
                let send = self.send_to(&pending.peer, self.payloads.join_request.clone())?;
                let state = HandshakeState::Connected(PendingStep::Join);
                let deadline = self.env.now() + self.config.join_timeout;
                self.handshakes
                    .entry(pending.peer.id())
                    .and_modify(|h| h.state = state)
                    .or_insert_with(|| Handshake::new(pending.peer.clone(), state, Some(deadline)));

                info!(peer = %pending.peer, "connected, sent join request");
                Ok(vec![send])
            },
        }
    }

    fn on_disconnected(&mut self, peer: &PeerIdentity) -> Vec<LobbyAction> {
        let id = peer.id();
        let mut actions = Vec::new();

        match self.handshake_state(id) {
            // The request connection always drops; the deadline bounds the wait
            // for the counter-invite
            HandshakeState::InvitationRequestSent | HandshakeState::InviteReceived => {},
            HandshakeState::Connected(PendingStep::Join) => {
                self.handshakes.remove(&id);
                warn!(peer = %peer, "disconnected before join was confirmed");
                actions.push(LobbyAction::Notify(Notification::JoinFailed {
                    peer: peer.clone(),
                    reason: JoinFailure::Disconnected,
                }));
            },
            HandshakeState::Connected(PendingStep::Accept) => {
                self.handshakes.remove(&id);
                debug!(peer = %peer, "joiner disconnected before requesting");
            },
            HandshakeState::Idle | HandshakeState::LobbyJoined => {},
        }

        if self.lobby.contains(id) {
            if self.config.evict_on_disconnect {
                self.lobby.remove(id);
                self.handshakes.remove(&id);
                info!(peer = %peer, "member left");
                actions.push(LobbyAction::Notify(Notification::MemberLeft { peer: peer.clone() }));
            } else {
                info!(peer = %peer, "member disconnected");
                actions.push(LobbyAction::Notify(Notification::MemberDisconnected {
                    peer: peer.clone(),
                }));
            }
        }

        actions
    }

    pub(super) fn on_message(
        &mut self,
        from: PeerIdentity,
        payload: &[u8],
    ) -> Result<Vec<LobbyAction>, LobbyError> {
        let message = LobbyMessage::decode(payload)?;
        debug!(peer = %from, ?message, "received message");

        match message {
            LobbyMessage::JoinRequest => self.accept_join_request(from),
            LobbyMessage::AcceptJoinRequest => self.confirm_join(from),
        }
    }

    fn accept_join_request(&mut self, from: PeerIdentity) -> Result<Vec<LobbyAction>, LobbyError> {
        let id = from.id();
        let reply = self.send_to(&from, self.payloads.accept_join_request.clone())?;

        // Receiving the request makes us host; our own crossing attempt is moot
        self.pending.remove(&id);
        self.handshakes.insert(id, Handshake::new(from.clone(), HandshakeState::LobbyJoined, None));

        let mut actions = Vec::new();
        if self.lobby.insert(from.clone()) {
            info!(peer = %from, members = self.lobby.len(), "accepted join request");
            actions.push(LobbyAction::Notify(Notification::MemberJoined { peer: from }));
        } else {
            debug!(peer = %from, "re-acknowledged join request from member");
        }
        actions.push(reply);

        Ok(actions)
    }

    fn confirm_join(&mut self, from: PeerIdentity) -> Result<Vec<LobbyAction>, LobbyError> {
        let id = from.id();

        if self.lobby.contains(id) {
            debug!(peer = %from, "repeated join acceptance from member");
            return Ok(Vec::new());
        }

        if self.handshake_state(id) != HandshakeState::Connected(PendingStep::Join) {
            warn!(peer = %from, "unsolicited join acceptance");
            return Err(LobbyError::UnexpectedMessage {
                peer: from,
                message: LobbyMessage::AcceptJoinRequest,
            });
        }

        self.handshakes.insert(id, Handshake::new(from.clone(), HandshakeState::LobbyJoined, None));

        let mut actions = Vec::new();
        if self.lobby.insert(from.clone()) {
            info!(peer = %from, members = self.lobby.len(), "joined lobby");
            actions.push(LobbyAction::Notify(Notification::MemberJoined { peer: from }));
        }

        Ok(actions)
    }

    /// Expire handshakes past their deadline.
    pub(super) fn tick(&mut self) -> Vec<LobbyAction> {
        let now = self.env.now();
        let expired: Vec<PeerId> = self
            .handshakes
            .iter()
            .filter(|(_, h)| h.deadline.is_some_and(|deadline| now >= deadline))
            .map(|(id, _)| *id)
            .collect();

        let mut actions = Vec::new();
        for id in expired {
            self.pending.remove(&id);
            let Some(handshake) = self.handshakes.remove(&id) else {
                continue;
            };

            if handshake.state.is_joining() {
                warn!(peer = %handshake.peer, state = ?handshake.state, "join timed out");
                actions.push(LobbyAction::Notify(Notification::JoinFailed {
                    peer: handshake.peer,
                    reason: JoinFailure::TimedOut,
                }));
            } else {
                debug!(peer = %handshake.peer, state = ?handshake.state, "host handshake expired");
            }
        }

        actions
    }

    fn send_to(&self, peer: &PeerIdentity, payload: Bytes) -> Result<LobbyAction, LobbyError> {
        Ok(self.session.send(payload, slice::from_ref(peer), Reliability::Reliable)?)
    }
}
