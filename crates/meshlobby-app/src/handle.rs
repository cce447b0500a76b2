//! Cloneable handle to a running lobby.

use meshlobby_core::{LobbyError, LobbyEvent, LobbySnapshot, Notification, PeerId, PeerIdentity};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Reply channel for a join request.
pub(crate) type JoinReply = oneshot::Sender<Result<PeerIdentity, LobbyError>>;

/// Requests from handles to the runtime.
#[derive(Debug)]
pub(crate) enum Command {
    /// Feed a user command to the coordinator.
    Event(LobbyEvent),
    /// Join a peer and report the outcome.
    Join { peer: PeerId, reply: JoinReply },
    /// Stop the runtime.
    Shutdown,
}

/// Handle to a [`crate::Runtime`].
///
/// All methods fail with [`LobbyError::ShutDown`] once the runtime has
/// stopped.
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<LobbySnapshot>,
    notifications: broadcast::Sender<Notification>,
}

impl LobbyHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshot: watch::Receiver<LobbySnapshot>,
        notifications: broadcast::Sender<Notification>,
    ) -> Self {
        Self { commands, snapshot, notifications }
    }

    /// Start advertising and browsing.
    pub async fn host(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::Host).await
    }

    /// Start advertising.
    pub async fn advertise(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::Advertise).await
    }

    /// Start browsing.
    pub async fn browse(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::Browse).await
    }

    /// Stop advertising.
    pub async fn stop_advertising(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::StopAdvertising).await
    }

    /// Stop browsing.
    pub async fn stop_browsing(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::StopBrowsing).await
    }

    /// Leave the lobby under a fresh identity.
    pub async fn leave(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::Leave).await
    }

    /// Reset identity, session and discovery.
    pub async fn reset(&self) -> Result<(), LobbyError> {
        self.event(LobbyEvent::Reset).await
    }

    /// Join a discovered peer's lobby.
    ///
    /// Resolves with the peer once it is a lobby member, immediately if it
    /// already is one.
    ///
    /// # Errors
    ///
    /// - [`LobbyError::UnknownPeer`] if the peer has not been discovered
    /// - [`LobbyError::JoinTimedOut`] if the handshake missed its deadline
    /// - [`LobbyError::JoinAborted`] if the connection dropped or the session
    ///   was reset first
    pub async fn join(&self, peer: PeerId) -> Result<PeerIdentity, LobbyError> {
        let (reply, outcome) = oneshot::channel();
        self.send(Command::Join { peer, reply }).await?;
        outcome.await.map_err(|_| LobbyError::ShutDown)?
    }

    /// Latest published state.
    pub fn snapshot(&self) -> LobbySnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<LobbySnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Stop the runtime. Other handles fail from then on.
    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.send(Command::Shutdown).await
    }

    async fn event(&self, event: LobbyEvent) -> Result<(), LobbyError> {
        self.send(Command::Event(event)).await
    }

    async fn send(&self, command: Command) -> Result<(), LobbyError> {
        self.commands.send(command).await.map_err(|_| LobbyError::ShutDown)
    }
}
