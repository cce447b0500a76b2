//! World state for scenario execution.
//!
//! The World is an in-memory mesh. It owns one [`Coordinator`] per named node,
//! executes their actions as a transport would, and feeds the resulting
//! callbacks back through a single FIFO queue. Delivery order is fully
//! determined by the order in which actions are produced, so a seed and a
//! list of commands reproduce the same trace every time.
//!
//! Transport behavior modelled:
//!
//! - Advertisements reach every node browsing the same service tag,
//!   including the advertiser itself
//! - An invitation reaches the invitee's decision handler; accepting it runs a
//!   certificate check on the invitee, and approving that links both sessions
//! - Messages travel only over links
//! - Closing a session drops its links and reports `NotConnected` to the
//!   other side
//! - Callbacks addressed to a session that has since been closed are dropped

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    time::Duration,
};

use bytes::Bytes;
use meshlobby_core::{
    ConnectionState, Coordinator, CoordinatorConfig, DecisionEvent, DecisionId, DiscoveryEvent,
    LobbyAction, LobbyError, LobbyEvent, Notification, PeerId, PeerIdentity, TransportEvent,
};
use meshlobby_proto::DiscoveryInfo;
use tracing::{debug, trace, warn};

use crate::SimEnv;

/// Deliveries allowed per [`World::run_until_idle`] before giving up.
pub const MAX_DELIVERIES: usize = 10_000;

/// An event queued for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Receiving node
    pub to: String,
    /// Session the event is addressed to; `None` for commands and ticks
    pub session: Option<PeerId>,
    /// The event
    pub event: LobbyEvent,
}

#[derive(Debug, Clone)]
struct Advert {
    identity: PeerIdentity,
    service_tag: String,
    info: DiscoveryInfo,
}

#[derive(Debug, Clone)]
struct Invitation {
    inviter: String,
    from: PeerIdentity,
    invitee: String,
    to: PeerIdentity,
}

/// One simulated peer.
#[derive(Debug)]
pub struct Node {
    coordinator: Coordinator<SimEnv>,
    session: Option<PeerIdentity>,
    identities: Vec<PeerIdentity>,
    advert: Option<Advert>,
    browsing: Option<String>,
    notifications: Vec<Notification>,
    errors: Vec<LobbyError>,
    messages_sent: usize,
    messages_received: usize,
}

impl Node {
    fn new(coordinator: Coordinator<SimEnv>) -> Self {
        Self {
            coordinator,
            session: None,
            identities: Vec::new(),
            advert: None,
            browsing: None,
            notifications: Vec::new(),
            errors: Vec::new(),
            messages_sent: 0,
            messages_received: 0,
        }
    }

    /// The node's state machine.
    pub fn coordinator(&self) -> &Coordinator<SimEnv> {
        &self.coordinator
    }

    /// Current identity.
    pub fn identity(&self) -> &PeerIdentity {
        self.coordinator.local()
    }

    /// Every identity a session was opened under, oldest first.
    pub fn identities(&self) -> &[PeerIdentity] {
        &self.identities
    }

    /// Lobby members, ordered by id.
    pub fn members(&self) -> Vec<PeerIdentity> {
        self.coordinator.lobby().members().cloned().collect()
    }

    /// Notifications emitted so far.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Errors returned by the coordinator so far.
    pub fn errors(&self) -> &[LobbyError] {
        &self.errors
    }

    /// Messages this node put on a link.
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// Messages delivered to this node.
    pub fn messages_received(&self) -> usize {
        self.messages_received
    }
}

/// Simulated mesh containing all nodes.
#[derive(Debug)]
pub struct World {
    env: SimEnv,
    nodes: BTreeMap<String, Node>,
    queue: VecDeque<Delivery>,
    links: BTreeSet<(PeerId, PeerId)>,
    invitations: BTreeMap<DecisionId, Invitation>,
    certificates: BTreeMap<DecisionId, Invitation>,
    next_decision: u64,
    trace: Vec<Delivery>,
}

impl World {
    /// Empty world whose identities are fixed by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            nodes: BTreeMap::new(),
            queue: VecDeque::new(),
            links: BTreeSet::new(),
            invitations: BTreeMap::new(),
            certificates: BTreeMap::new(),
            next_decision: 0,
            trace: Vec::new(),
        }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Add a node and open its first session.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        config: CoordinatorConfig,
    ) -> Result<(), String> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(format!("node {name} already exists"));
        }

        let coordinator = Coordinator::new(self.env.clone(), config)
            .map_err(|e| format!("node {name}: {e}"))?;
        let actions = coordinator.start();
        self.nodes.insert(name.clone(), Node::new(coordinator));

        for action in actions {
            self.execute(&name, action);
        }
        Ok(())
    }

    /// Get a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// All nodes, ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Current identity of a node.
    pub fn identity(&self, name: &str) -> Option<&PeerIdentity> {
        self.nodes.get(name).map(Node::identity)
    }

    /// Node that owns `peer` under any of its past or present identities.
    pub fn name_of(&self, peer: PeerId) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(_, node)| node.identities.iter().any(|identity| identity.id() == peer))
            .map(|(name, _)| name.as_str())
    }

    /// Names of a node's lobby members.
    pub fn member_names(&self, name: &str) -> Option<Vec<String>> {
        let node = self.nodes.get(name)?;
        Some(
            node.coordinator
                .lobby()
                .members()
                .filter_map(|member| self.name_of(member.id()))
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Whether the sessions of `a` and `b` are linked.
    pub fn linked(&self, a: PeerId, b: PeerId) -> bool {
        self.links.contains(&link(a, b))
    }

    /// Every delivery so far, in order.
    pub fn trace(&self) -> &[Delivery] {
        &self.trace
    }

    /// Number of queued deliveries.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a command for a node.
    pub fn command(&mut self, name: &str, event: LobbyEvent) {
        self.queue.push_back(Delivery { to: name.to_owned(), session: None, event });
    }

    /// Queue `Host` for a node.
    pub fn host(&mut self, name: &str) {
        self.command(name, LobbyEvent::Host);
    }

    /// Queue a join of `target`'s current identity.
    pub fn join(&mut self, name: &str, target: &str) -> Result<(), String> {
        let peer = self.identity(target).ok_or_else(|| format!("node {target} not found"))?.id();
        self.command(name, LobbyEvent::Join { peer });
        Ok(())
    }

    /// Deliver queued events until the mesh is quiet.
    ///
    /// Returns the number of deliveries made.
    pub fn run_until_idle(&mut self) -> Result<usize, String> {
        let mut delivered = 0;
        while let Some(delivery) = self.queue.pop_front() {
            if delivered == MAX_DELIVERIES {
                return Err(format!("mesh did not settle after {MAX_DELIVERIES} deliveries"));
            }
            self.deliver(delivery);
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Deliver the next queued event. Returns `false` if the queue was empty.
    pub fn step(&mut self) -> bool {
        let Some(delivery) = self.queue.pop_front() else {
            return false;
        };
        self.deliver(delivery);
        true
    }

    /// Deliver up to `count` queued events, stopping early if the mesh goes
    /// quiet. Returns the number delivered.
    pub fn run_steps(&mut self, count: usize) -> usize {
        (0..count).take_while(|_| self.step()).count()
    }

    /// Advance the clock, tick every node, and settle.
    pub fn advance(&mut self, duration: Duration) -> Result<usize, String> {
        self.env.advance(duration);
        let names: Vec<String> = self.nodes.keys().cloned().collect();
        for name in names {
            self.command(&name, LobbyEvent::Tick);
        }
        self.run_until_idle()
    }

    fn deliver(&mut self, delivery: Delivery) {
        let result = {
            let Some(node) = self.nodes.get_mut(&delivery.to) else {
                warn!(to = %delivery.to, "delivery to unknown node");
                return;
            };

            if let Some(addressed) = delivery.session
                && node.session.as_ref().map(PeerIdentity::id) != Some(addressed)
            {
                trace!(to = %delivery.to, "dropping callback for closed session");
                return;
            }

            if matches!(delivery.event, LobbyEvent::Transport(TransportEvent::MessageReceived { .. }))
            {
                node.messages_received += 1;
            }

            self.trace.push(delivery.clone());
            node.coordinator.handle(delivery.event)
        };

        match result {
            Ok(actions) => {
                for action in actions {
                    self.execute(&delivery.to, action);
                }
            },
            Err(e) => {
                warn!(node = %delivery.to, error = %e, "event rejected");
                if let Some(node) = self.nodes.get_mut(&delivery.to) {
                    node.errors.push(e);
                }
            },
        }
    }

    fn execute(&mut self, name: &str, action: LobbyAction) {
        trace!(node = name, ?action, "execute");
        match action {
            LobbyAction::StartAdvertising { identity, service_tag, info } => {
                for browser in self.browsers(&service_tag) {
                    self.post(&browser, DiscoveryEvent::PeerFound {
                        identity: identity.clone(),
                        info: info.clone(),
                    });
                }
                if let Some(node) = self.nodes.get_mut(name) {
                    node.advert = Some(Advert { identity, service_tag, info });
                }
            },
            LobbyAction::StopAdvertising => {
                let Some(advert) = self.nodes.get_mut(name).and_then(|n| n.advert.take()) else {
                    return;
                };
                for browser in self.browsers(&advert.service_tag) {
                    self.post(&browser, DiscoveryEvent::PeerLost { identity: advert.identity.clone() });
                }
            },
            LobbyAction::StartBrowsing { service_tag, .. } => {
                let found: Vec<(PeerIdentity, DiscoveryInfo)> = self
                    .nodes
                    .values()
                    .filter_map(|n| n.advert.as_ref())
                    .filter(|advert| advert.service_tag == service_tag)
                    .map(|advert| (advert.identity.clone(), advert.info.clone()))
                    .collect();
                if let Some(node) = self.nodes.get_mut(name) {
                    node.browsing = Some(service_tag);
                }
                for (identity, info) in found {
                    self.post(name, DiscoveryEvent::PeerFound { identity, info });
                }
            },
            LobbyAction::StopBrowsing => {
                if let Some(node) = self.nodes.get_mut(name) {
                    node.browsing = None;
                }
            },
            LobbyAction::Invite { peer, payload, .. } => self.invite(name, peer, payload),
            LobbyAction::RespondToInvitation { decision, accept } => {
                self.respond_to_invitation(decision, accept);
            },
            LobbyAction::RespondToCertificate { decision, accept } => {
                self.respond_to_certificate(decision, accept);
            },
            LobbyAction::Send { peers, payload, .. } => self.send(name, &peers, &payload),
            LobbyAction::CancelConnection { peer } => self.cancel(name, peer),
            LobbyAction::CloseSession => self.close_session(name),
            LobbyAction::OpenSession { identity } => {
                if let Some(node) = self.nodes.get_mut(name) {
                    node.session = Some(identity.clone());
                    node.identities.push(identity);
                }
            },
            LobbyAction::Notify(notification) => {
                debug!(node = name, ?notification, "notify");
                if let Some(node) = self.nodes.get_mut(name) {
                    node.notifications.push(notification);
                }
            },
        }
    }

    fn invite(&mut self, name: &str, peer: PeerIdentity, context: Bytes) {
        let Some(from) = self.session_of(name) else {
            return;
        };
        let Some(invitee) = self.node_of(peer.id()) else {
            debug!(node = name, %peer, "invitee unreachable");
            self.post(name, state_changed(peer, ConnectionState::NotConnected));
            return;
        };

        let decision = self.next_decision();
        self.post(name, state_changed(peer.clone(), ConnectionState::Connecting));
        self.post(&invitee, DecisionEvent::InvitationReceived { decision, from: from.clone(), context });
        self.invitations
            .insert(decision, Invitation { inviter: name.to_owned(), from, invitee, to: peer });
    }

    fn respond_to_invitation(&mut self, decision: DecisionId, accept: bool) {
        let Some(invitation) = self.invitations.remove(&decision) else {
            warn!(?decision, "response to unknown invitation");
            return;
        };
        if !self.is_current(&invitation) {
            trace!(?decision, "invitation outlived its sessions");
            return;
        }

        if accept {
            let certificate = self.next_decision();
            self.post(&invitation.invitee, DecisionEvent::CertificateReceived {
                decision: certificate,
                from: invitation.from.clone(),
            });
            self.certificates.insert(certificate, invitation);
        } else {
            self.post(&invitation.inviter, state_changed(invitation.to, ConnectionState::NotConnected));
        }
    }

    fn respond_to_certificate(&mut self, decision: DecisionId, accept: bool) {
        let Some(invitation) = self.certificates.remove(&decision) else {
            warn!(?decision, "response to unknown certificate check");
            return;
        };
        if !self.is_current(&invitation) {
            trace!(?decision, "certificate check outlived its sessions");
            return;
        }

        if accept {
            self.links.insert(link(invitation.from.id(), invitation.to.id()));
            self.post(
                &invitation.invitee,
                state_changed(invitation.from.clone(), ConnectionState::Connected),
            );
            self.post(&invitation.inviter, state_changed(invitation.to, ConnectionState::Connected));
        } else {
            self.post(&invitation.inviter, state_changed(invitation.to, ConnectionState::NotConnected));
        }
    }

    fn send(&mut self, name: &str, peers: &[PeerIdentity], payload: &Bytes) {
        let Some(from) = self.session_of(name) else {
            return;
        };

        for peer in peers {
            if !self.linked(from.id(), peer.id()) {
                warn!(node = name, %peer, "dropping message without a link");
                continue;
            }
            let Some(target) = self.node_of(peer.id()) else {
                continue;
            };

            self.post(&target, TransportEvent::MessageReceived {
                from: from.clone(),
                payload: payload.clone(),
            });
            if let Some(node) = self.nodes.get_mut(name) {
                node.messages_sent += 1;
            }
        }
    }

    fn cancel(&mut self, name: &str, peer: PeerIdentity) {
        let Some(local) = self.session_of(name) else {
            return;
        };

        if self.links.remove(&link(local.id(), peer.id())) {
            if let Some(target) = self.node_of(peer.id()) {
                self.post(&target, state_changed(local, ConnectionState::NotConnected));
            }
        }
        self.post(name, state_changed(peer, ConnectionState::NotConnected));
    }

    fn close_session(&mut self, name: &str) {
        let Some(old) = self.nodes.get_mut(name).and_then(|n| n.session.take()) else {
            return;
        };

        let id = old.id();
        let peers: Vec<PeerId> = self
            .links
            .iter()
            .filter_map(|&(a, b)| match (a == id, b == id) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect();
        self.links.retain(|&(a, b)| a != id && b != id);

        for peer in peers {
            if let Some(target) = self.node_of(peer) {
                self.post(&target, state_changed(old.clone(), ConnectionState::NotConnected));
            }
        }
    }

    /// Queue a callback for a node's current session. Dropped if it has none.
    fn post(&mut self, to: &str, event: impl Into<LobbyEvent>) {
        let Some(session) = self.nodes.get(to).and_then(|n| n.session.as_ref()).map(PeerIdentity::id)
        else {
            return;
        };
        self.queue.push_back(Delivery { to: to.to_owned(), session: Some(session), event: event.into() });
    }

    fn browsers(&self, service_tag: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.browsing.as_deref() == Some(service_tag))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn session_of(&self, name: &str) -> Option<PeerIdentity> {
        self.nodes.get(name).and_then(|n| n.session.clone())
    }

    /// Node whose current session is `peer`.
    fn node_of(&self, peer: PeerId) -> Option<String> {
        self.nodes
            .iter()
            .find(|(_, node)| node.session.as_ref().is_some_and(|s| s.id() == peer))
            .map(|(name, _)| name.clone())
    }

    fn is_current(&self, invitation: &Invitation) -> bool {
        let current = |name: &str, identity: &PeerIdentity| {
            self.session_of(name).is_some_and(|s| s.id() == identity.id())
        };
        current(&invitation.inviter, &invitation.from) && current(&invitation.invitee, &invitation.to)
    }

    fn next_decision(&mut self) -> DecisionId {
        self.next_decision += 1;
        DecisionId(self.next_decision)
    }
}

fn link(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a <= b { (a, b) } else { (b, a) }
}

fn state_changed(peer: PeerIdentity, state: ConnectionState) -> TransportEvent {
    TransportEvent::StateChanged { peer, state }
}
