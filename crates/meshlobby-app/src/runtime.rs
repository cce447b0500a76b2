//! Generic lobby runtime.
//!
//! The [`Runtime`] is the single writer: it owns the [`Coordinator`] and
//! serializes every input onto one task.
//!
//! ```text
//!   LobbyHandle ─── commands ───┐
//!                               ▼
//!   Driver::next_event ───> Runtime ───> Coordinator::handle
//!                               ▲                 │
//!   Environment::sleep ─────────┘                 ▼ actions
//!                                   Driver calls, snapshot, notifications
//! ```
//!
//! Driver failures on start are fed back to the coordinator as discovery
//! events. Everything else the driver rejects is logged; a join that depends
//! on it fails at its deadline.

use std::{
    collections::{BTreeMap, VecDeque},
    pin::pin,
};

use meshlobby_core::{
    Coordinator, CoordinatorConfig, DiscoveryEvent, Environment, HandshakeState, JoinFailure,
    LobbyAction, LobbyError, LobbyEvent, LobbySnapshot, Notification, PeerId, PeerIdentity,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    config::RuntimeConfig,
    driver::Driver,
    handle::{Command, JoinReply, LobbyHandle},
};

/// Callers waiting on one join.
struct Waiters {
    peer: PeerIdentity,
    replies: Vec<JoinReply>,
}

/// Orchestrates a [`Coordinator`] against a [`Driver`].
///
/// Runs until [`LobbyHandle::shutdown`] is called, every handle is dropped or
/// the driver stops producing events.
pub struct Runtime<D: Driver, E: Environment> {
    env: E,
    coordinator: Coordinator<E>,
    driver: D,
    config: RuntimeConfig,
    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<LobbySnapshot>,
    notifications: broadcast::Sender<Notification>,
    joins: BTreeMap<PeerId, Waiters>,
}

impl<D: Driver, E: Environment> Runtime<D, E> {
    /// Create a runtime and its first handle.
    ///
    /// Nothing happens until [`Runtime::run`] is polled.
    pub fn new(
        env: E,
        driver: D,
        lobby: CoordinatorConfig,
        config: RuntimeConfig,
    ) -> Result<(Self, LobbyHandle), LobbyError> {
        let coordinator = Coordinator::new(env.clone(), lobby)?;

        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (snapshot, snapshot_rx) = watch::channel(coordinator.snapshot());
        let (notifications, _) = broadcast::channel(config.notification_buffer.max(1));
        let handle = LobbyHandle::new(command_tx, snapshot_rx, notifications.clone());

        let runtime = Self {
            env,
            coordinator,
            driver,
            config,
            commands,
            snapshot,
            notifications,
            joins: BTreeMap::new(),
        };
        Ok((runtime, handle))
    }

    /// Coordinator state.
    pub fn coordinator(&self) -> &Coordinator<E> {
        &self.coordinator
    }

    /// Run the event loop.
    ///
    /// Ticks are timed by the environment, one `tick_interval` after the
    /// previous tick was handled.
    pub async fn run(mut self) {
        let env = self.env.clone();
        let period = self.config.tick_interval;
        let mut tick = pin!(env.sleep(period));

        info!(peer = %self.coordinator.local(), "lobby runtime started");
        let start = self.coordinator.start();
        for event in self.execute_all(start).await {
            self.process(event).await;
        }
        self.publish();

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Event(event)) => self.process(event).await,
                    Some(Command::Join { peer, reply }) => self.join(peer, reply).await,
                    Some(Command::Shutdown) | None => break,
                },

                event = self.driver.next_event() => match event {
                    Some(event) => self.process(event).await,
                    None => {
                        warn!("driver stopped producing events");
                        break;
                    },
                },

                () = &mut tick => {
                    self.process(LobbyEvent::Tick).await;
                    tick.set(env.sleep(period));
                },
            }
        }

        self.stop().await;
    }

    /// Feed one event through the coordinator, then any events its actions
    /// produce.
    async fn process(&mut self, event: LobbyEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            match self.coordinator.handle(event) {
                Ok(actions) => queue.extend(self.execute_all(actions).await),
                Err(error) => warn!(%error, "event rejected"),
            }
        }

        self.settle_joins();
        self.publish();
    }

    async fn join(&mut self, peer: PeerId, reply: JoinReply) {
        if let Some(member) = self.coordinator.lobby().members().find(|m| m.id() == peer) {
            let _ = reply.send(Ok(member.clone()));
            return;
        }
        let Some(target) = self.coordinator.discovery().get(peer) else {
            let _ = reply.send(Err(LobbyError::UnknownPeer));
            return;
        };

        let identity = target.identity.clone();
        self.joins
            .entry(peer)
            .or_insert_with(|| Waiters { peer: identity, replies: Vec::new() })
            .replies
            .push(reply);

        self.process(LobbyEvent::Join { peer }).await;
    }

    async fn execute_all(&mut self, actions: Vec<LobbyAction>) -> Vec<LobbyEvent> {
        let mut feedback = Vec::new();
        for action in actions {
            feedback.extend(self.execute(action).await);
        }
        feedback
    }

    /// Execute one action. Returns an event to feed back when the driver
    /// reports a failure the coordinator tracks.
    async fn execute(&mut self, action: LobbyAction) -> Option<LobbyEvent> {
        match action {
            LobbyAction::StartAdvertising { identity, service_tag, info } => {
                if let Err(error) = self.driver.start_advertising(&identity, &service_tag, &info) {
                    let reason = error.to_string();
                    return Some(DiscoveryEvent::AdvertisingFailed { reason }.into());
                }
            },
            LobbyAction::StopAdvertising => self.driver.stop_advertising(),
            LobbyAction::StartBrowsing { identity, service_tag } => {
                if let Err(error) = self.driver.start_browsing(&identity, &service_tag) {
                    let reason = error.to_string();
                    return Some(DiscoveryEvent::BrowsingFailed { reason }.into());
                }
            },
            LobbyAction::StopBrowsing => self.driver.stop_browsing(),
            LobbyAction::Invite { peer, payload, timeout } => {
                if let Err(error) = self.driver.invite(&peer, payload, timeout) {
                    warn!(%peer, %error, "invitation failed");
                }
            },
            LobbyAction::RespondToInvitation { decision, accept } => {
                if let Err(error) = self.driver.respond_to_invitation(decision, accept) {
                    warn!(?decision, %error, "invitation response failed");
                }
            },
            LobbyAction::RespondToCertificate { decision, accept } => {
                if let Err(error) = self.driver.respond_to_certificate(decision, accept) {
                    warn!(?decision, %error, "certificate response failed");
                }
            },
            LobbyAction::Send { peers, payload, reliability } => {
                if let Err(error) = self.driver.send(&peers, payload, reliability).await {
                    warn!(recipients = peers.len(), %error, "send failed");
                }
            },
            LobbyAction::CancelConnection { peer } => self.driver.cancel_connection(&peer),
            LobbyAction::CloseSession => self.driver.close_session(),
            LobbyAction::OpenSession { identity } => {
                if let Err(error) = self.driver.open_session(&identity) {
                    warn!(peer = %identity, %error, "failed to open session");
                }
            },
            LobbyAction::Notify(notification) => self.notify(notification),
        }
        None
    }

    fn notify(&mut self, notification: Notification) {
        match &notification {
            Notification::MemberJoined { peer } => self.resolve(peer.id(), Ok(peer.clone())),
            Notification::JoinFailed { peer, reason } => {
                self.resolve(peer.id(), Err(LobbyError::join_failed(peer.clone(), *reason)));
            },
            Notification::IdentityChanged { .. } => {
                let peers: Vec<PeerId> = self.joins.keys().copied().collect();
                for peer in peers {
                    self.fail(peer, JoinFailure::Reset);
                }
            },
            _ => {},
        }

        // Nobody listening is fine
        let _ = self.notifications.send(notification);
    }

    fn resolve(&mut self, peer: PeerId, outcome: Result<PeerIdentity, LobbyError>) {
        let Some(waiters) = self.joins.remove(&peer) else {
            return;
        };

        debug!(peer = %waiters.peer, callers = waiters.replies.len(), "join settled");
        for reply in waiters.replies {
            let _ = reply.send(outcome.clone());
        }
    }

    fn fail(&mut self, peer: PeerId, reason: JoinFailure) {
        if let Some(identity) = self.joins.get(&peer).map(|w| w.peer.clone()) {
            self.resolve(peer, Err(LobbyError::join_failed(identity, reason)));
        }
    }

    /// Fail joins whose handshake ended without a notification, such as a
    /// host-side handshake from a crossing join expiring.
    fn settle_joins(&mut self) {
        let stalled: Vec<PeerId> = self
            .joins
            .keys()
            .copied()
            .filter(|&peer| self.coordinator.handshake_state(peer) == HandshakeState::Idle)
            .collect();

        for peer in stalled {
            self.fail(peer, JoinFailure::TimedOut);
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.coordinator.snapshot());
    }

    async fn stop(&mut self) {
        info!(peer = %self.coordinator.local(), "lobby runtime stopping");
        for event in [LobbyEvent::StopAdvertising, LobbyEvent::StopBrowsing] {
            self.process(event).await;
        }
        self.driver.close_session();

        // Dropped replies surface as ShutDown
        self.joins.clear();
    }
}
