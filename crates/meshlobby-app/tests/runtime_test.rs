//! Runtime tests against a scripted driver.
//!
//! The test plays the remote peer: it reads the driver calls the runtime makes
//! and feeds back the transport callbacks a real mesh would produce.

use std::{
    future::{self, Future},
    time::{Duration, Instant},
};

use bytes::Bytes;
use meshlobby_app::{Driver, LobbyHandle, Runtime, RuntimeConfig};
use meshlobby_core::{
    ConnectionState, CoordinatorConfig, DecisionEvent, DecisionId, DiscoveryEvent, Environment,
    JoinFailure, LobbyAction, LobbyError, LobbyEvent, Notification, PeerId, PeerIdentity,
    Reliability, Service, TransportEvent,
};
use meshlobby_proto::{DiscoveryInfo, InvitationContext, LobbyMessage, WirePayload};
use rand::RngCore;
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};

/// Tokio clock, so paused tests move coordinator deadlines too.
#[derive(Clone)]
struct TokioEnv;

impl Environment for TokioEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("scripted failure: {0}")]
struct ScriptError(&'static str);

/// Records every call as the equivalent action and replays scripted events.
struct ScriptedDriver {
    events: mpsc::UnboundedReceiver<LobbyEvent>,
    executed: mpsc::UnboundedSender<LobbyAction>,
    refuse_advertising: bool,
}

impl ScriptedDriver {
    fn record(&self, action: LobbyAction) {
        let _ = self.executed.send(action);
    }
}

impl Driver for ScriptedDriver {
    type Error = ScriptError;

    fn next_event(&mut self) -> impl Future<Output = Option<LobbyEvent>> + Send {
        self.events.recv()
    }

    fn start_advertising(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &str,
        info: &DiscoveryInfo,
    ) -> Result<(), ScriptError> {
        if self.refuse_advertising {
            return Err(ScriptError("radio off"));
        }
        self.record(LobbyAction::StartAdvertising {
            identity: identity.clone(),
            service_tag: service_tag.to_owned(),
            info: info.clone(),
        });
        Ok(())
    }

    fn stop_advertising(&mut self) {
        self.record(LobbyAction::StopAdvertising);
    }

    fn start_browsing(&mut self, identity: &PeerIdentity, service_tag: &str) -> Result<(), ScriptError> {
        self.record(LobbyAction::StartBrowsing {
            identity: identity.clone(),
            service_tag: service_tag.to_owned(),
        });
        Ok(())
    }

    fn stop_browsing(&mut self) {
        self.record(LobbyAction::StopBrowsing);
    }

    fn invite(
        &mut self,
        peer: &PeerIdentity,
        context: Bytes,
        timeout: Duration,
    ) -> Result<(), ScriptError> {
        self.record(LobbyAction::Invite { peer: peer.clone(), payload: context, timeout });
        Ok(())
    }

    fn respond_to_invitation(&mut self, decision: DecisionId, accept: bool) -> Result<(), ScriptError> {
        self.record(LobbyAction::RespondToInvitation { decision, accept });
        Ok(())
    }

    fn respond_to_certificate(
        &mut self,
        decision: DecisionId,
        accept: bool,
    ) -> Result<(), ScriptError> {
        self.record(LobbyAction::RespondToCertificate { decision, accept });
        Ok(())
    }

    fn send(
        &mut self,
        peers: &[PeerIdentity],
        payload: Bytes,
        reliability: Reliability,
    ) -> impl Future<Output = Result<(), ScriptError>> + Send {
        self.record(LobbyAction::Send { peers: peers.to_vec(), payload, reliability });
        future::ready(Ok(()))
    }

    fn cancel_connection(&mut self, peer: &PeerIdentity) {
        self.record(LobbyAction::CancelConnection { peer: peer.clone() });
    }

    fn open_session(&mut self, identity: &PeerIdentity) -> Result<(), ScriptError> {
        self.record(LobbyAction::OpenSession { identity: identity.clone() });
        Ok(())
    }

    fn close_session(&mut self) {
        self.record(LobbyAction::CloseSession);
    }
}

struct Lobby {
    handle: LobbyHandle,
    events: mpsc::UnboundedSender<LobbyEvent>,
    executed: mpsc::UnboundedReceiver<LobbyAction>,
    task: JoinHandle<()>,
}

impl Lobby {
    fn spawn(refuse_advertising: bool) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (executed_tx, executed) = mpsc::unbounded_channel();
        let driver = ScriptedDriver { events, executed: executed_tx, refuse_advertising };

        let (runtime, handle) = Runtime::new(
            TokioEnv,
            driver,
            CoordinatorConfig::default(),
            RuntimeConfig::default(),
        )
        .unwrap();
        let task = tokio::spawn(runtime.run());

        Self { handle, events: events_tx, executed, task }
    }

    /// Skip driver calls until one matches.
    async fn expect(&mut self, wanted: impl Fn(&LobbyAction) -> bool) -> LobbyAction {
        loop {
            let action = timeout(Duration::from_secs(5), self.executed.recv())
                .await
                .expect("driver call within 5s")
                .expect("runtime should be running");
            if wanted(&action) {
                return action;
            }
        }
    }

    fn feed(&self, event: impl Into<LobbyEvent>) {
        self.events.send(event.into()).unwrap();
    }

    async fn hosting() -> Self {
        let mut lobby = Self::spawn(false);
        lobby.handle.host().await.unwrap();
        lobby.expect(|a| matches!(a, LobbyAction::StartBrowsing { .. })).await;
        lobby
    }

    async fn discover(&mut self, peer: &PeerIdentity) {
        self.feed(DiscoveryEvent::PeerFound {
            identity: peer.clone(),
            info: DiscoveryInfo::with_iteration(1),
        });

        let mut watch = self.handle.watch();
        timeout(
            Duration::from_secs(5),
            watch.wait_for(|s| s.discovered.iter().any(|p| p.identity == *peer)),
        )
        .await
        .expect("peer discovered within 5s")
        .unwrap();
    }

    fn start_join(&self, peer: PeerId) -> JoinHandle<Result<PeerIdentity, LobbyError>> {
        let handle = self.handle.clone();
        tokio::spawn(async move { handle.join(peer).await })
    }

    async fn expect_invite(&mut self, peer: &PeerIdentity) -> InvitationContext {
        let action = self
            .expect(|a| matches!(a, LobbyAction::Invite { peer: to, .. } if to == peer))
            .await;
        let LobbyAction::Invite { payload, .. } = action else { unreachable!() };
        InvitationContext::decode(&payload).unwrap()
    }

    /// Play the host side of a join that has already sent its invitation request.
    async fn accept_from(&mut self, host: &PeerIdentity) {
        self.feed(DecisionEvent::InvitationReceived {
            decision: DecisionId(1),
            from: host.clone(),
            context: InvitationContext::Invite.encode().unwrap(),
        });
        self.expect(|a| {
            *a == LobbyAction::RespondToInvitation { decision: DecisionId(1), accept: true }
        })
        .await;

        self.feed(DecisionEvent::CertificateReceived { decision: DecisionId(2), from: host.clone() });
        self.expect(|a| {
            *a == LobbyAction::RespondToCertificate { decision: DecisionId(2), accept: true }
        })
        .await;

        self.feed(TransportEvent::StateChanged {
            peer: host.clone(),
            state: ConnectionState::Connected,
        });
        let action = self.expect(|a| matches!(a, LobbyAction::Send { .. })).await;
        let LobbyAction::Send { peers, payload, .. } = action else { unreachable!() };
        assert_eq!(peers, vec![host.clone()]);
        assert_eq!(LobbyMessage::decode(&payload).unwrap(), LobbyMessage::JoinRequest);

        self.feed(TransportEvent::MessageReceived {
            from: host.clone(),
            payload: LobbyMessage::AcceptJoinRequest.encode().unwrap(),
        });
    }
}

fn bob() -> PeerIdentity {
    PeerIdentity::new(PeerId::from_u128(0xb0b), "bob")
}

#[tokio::test]
async fn start_opens_session() {
    let mut lobby = Lobby::spawn(false);
    let local = lobby.handle.snapshot().local;

    let action = lobby.expect(|_| true).await;
    assert_eq!(action, LobbyAction::OpenSession { identity: local });
}

#[tokio::test]
async fn host_starts_advertising_and_browsing() {
    let mut lobby = Lobby::spawn(false);
    lobby.handle.host().await.unwrap();

    let advertised = lobby.expect(|a| matches!(a, LobbyAction::StartAdvertising { .. })).await;
    let LobbyAction::StartAdvertising { service_tag, info, .. } = advertised else {
        unreachable!()
    };
    assert_eq!(service_tag, "meshlobby");
    assert_eq!(info.iteration(), Some(1));
    lobby.expect(|a| matches!(a, LobbyAction::StartBrowsing { .. })).await;

    let mut watch = lobby.handle.watch();
    let snapshot = watch.wait_for(|s| s.advertising && s.browsing).await.unwrap().clone();
    assert!(snapshot.discovered.is_empty());
}

#[tokio::test]
async fn join_resolves_when_host_accepts() {
    let mut lobby = Lobby::hosting().await;
    let bob = bob();
    lobby.discover(&bob).await;
    let mut notifications = lobby.handle.subscribe();

    let joining = lobby.start_join(bob.id());
    assert_eq!(lobby.expect_invite(&bob).await, InvitationContext::InvitationRequest);
    lobby.accept_from(&bob).await;

    let joined = timeout(Duration::from_secs(5), joining).await.unwrap().unwrap().unwrap();
    assert_eq!(joined, bob);
    assert_eq!(notifications.recv().await.unwrap(), Notification::MemberJoined { peer: bob.clone() });

    let mut watch = lobby.handle.watch();
    let snapshot = watch.wait_for(|s| !s.members.is_empty()).await.unwrap().clone();
    assert_eq!(snapshot.members, vec![bob.clone()]);
    assert!(snapshot.joining.is_empty());

    // Already a member
    assert_eq!(lobby.handle.join(bob.id()).await.unwrap(), bob);
}

#[tokio::test]
async fn join_while_hosting_resolves_on_request() {
    let mut lobby = Lobby::hosting().await;
    let bob = bob();
    lobby.discover(&bob).await;

    lobby.feed(DecisionEvent::InvitationReceived {
        decision: DecisionId(1),
        from: bob.clone(),
        context: InvitationContext::InvitationRequest.encode().unwrap(),
    });
    lobby
        .expect(|a| *a == LobbyAction::RespondToInvitation { decision: DecisionId(1), accept: false })
        .await;
    assert_eq!(lobby.expect_invite(&bob).await, InvitationContext::Invite);

    let joining = lobby.start_join(bob.id());
    tokio::task::yield_now().await;

    lobby.feed(TransportEvent::StateChanged { peer: bob.clone(), state: ConnectionState::Connected });
    lobby.feed(TransportEvent::MessageReceived {
        from: bob.clone(),
        payload: LobbyMessage::JoinRequest.encode().unwrap(),
    });

    let reply = lobby.expect(|a| matches!(a, LobbyAction::Send { .. })).await;
    assert_eq!(reply, LobbyAction::Send {
        peers: vec![bob.clone()],
        payload: LobbyMessage::AcceptJoinRequest.encode().unwrap(),
        reliability: Reliability::Reliable,
    });

    let joined = timeout(Duration::from_secs(5), joining).await.unwrap().unwrap().unwrap();
    assert_eq!(joined, bob);

    // The host never invited back
    while let Ok(action) = lobby.executed.try_recv() {
        assert!(!matches!(action, LobbyAction::Invite { .. }), "unexpected {action:?}");
    }
}

#[tokio::test]
async fn join_of_undiscovered_peer_fails() {
    let lobby = Lobby::hosting().await;

    let result = lobby.handle.join(PeerId::from_u128(9)).await;
    assert_eq!(result, Err(LobbyError::UnknownPeer));
}

#[tokio::test(start_paused = true)]
async fn unanswered_join_times_out() {
    let mut lobby = Lobby::hosting().await;
    let bob = bob();
    lobby.discover(&bob).await;

    let joining = lobby.start_join(bob.id());
    lobby.expect_invite(&bob).await;

    let result = timeout(Duration::from_secs(60), joining).await.unwrap().unwrap();
    assert_eq!(result, Err(LobbyError::JoinTimedOut { peer: bob }));
    assert!(!lobby.handle.snapshot().joining.iter().any(|p| p.id() == PeerId::from_u128(0xb0b)));
}

#[tokio::test]
async fn leave_aborts_pending_join() {
    let mut lobby = Lobby::hosting().await;
    let bob = bob();
    lobby.discover(&bob).await;

    let joining = lobby.start_join(bob.id());
    lobby.expect_invite(&bob).await;
    lobby.handle.leave().await.unwrap();

    let result = timeout(Duration::from_secs(5), joining).await.unwrap().unwrap();
    assert_eq!(result, Err(LobbyError::JoinAborted { peer: bob, reason: JoinFailure::Reset }));
}

#[tokio::test]
async fn leave_replaces_identity() {
    let mut lobby = Lobby::hosting().await;
    let before = lobby.handle.snapshot().local;

    lobby.handle.leave().await.unwrap();
    lobby.expect(|a| *a == LobbyAction::CloseSession).await;
    let opened = lobby.expect(|a| matches!(a, LobbyAction::OpenSession { .. })).await;

    let mut watch = lobby.handle.watch();
    let snapshot = watch.wait_for(|s| s.iteration == 2).await.unwrap().clone();
    assert_ne!(snapshot.local, before);
    assert_eq!(opened, LobbyAction::OpenSession { identity: snapshot.local.clone() });
    assert!(snapshot.advertising && snapshot.browsing);
}

#[tokio::test]
async fn advertising_failure_is_reported() {
    let mut lobby = Lobby::spawn(true);
    let mut notifications = lobby.handle.subscribe();

    lobby.handle.host().await.unwrap();
    lobby.expect(|a| matches!(a, LobbyAction::StartBrowsing { .. })).await;

    let notification = timeout(Duration::from_secs(5), notifications.recv()).await.unwrap().unwrap();
    assert!(matches!(
        notification,
        Notification::ServiceFailed { service: Service::Advertising, .. }
    ));

    let mut watch = lobby.handle.watch();
    watch.wait_for(|s| s.browsing && !s.advertising).await.unwrap();
}

#[tokio::test]
async fn stream_from_peer_is_rejected() {
    let mut lobby = Lobby::hosting().await;
    let bob = bob();
    let mut notifications = lobby.handle.subscribe();

    lobby.feed(TransportEvent::StreamReceived { from: bob.clone(), name: "video".into() });

    let cancelled = lobby.expect(|a| matches!(a, LobbyAction::CancelConnection { .. })).await;
    assert_eq!(cancelled, LobbyAction::CancelConnection { peer: bob.clone() });
    let notification = notifications.recv().await.unwrap();
    assert!(matches!(notification, Notification::ProtocolViolation { peer, .. } if peer == bob));
}

#[tokio::test]
async fn shutdown_stops_runtime() {
    let mut lobby = Lobby::hosting().await;

    lobby.handle.shutdown().await.unwrap();
    lobby.expect(|a| *a == LobbyAction::StopAdvertising).await;
    lobby.expect(|a| *a == LobbyAction::StopBrowsing).await;
    lobby.expect(|a| *a == LobbyAction::CloseSession).await;

    let task = lobby.task;
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(lobby.handle.host().await, Err(LobbyError::ShutDown));
}
