//! Session reset.
//!
//! Tears down everything keyed by the current identity and comes back under
//! a fresh one:
//!
//! 1. Close the session
//! 2. Stop whichever of advertiser/browser is running
//! 3. Drop pending continuations unfired; report joins in flight as failed
//! 4. Clear discovered peers and lobby membership, bump the iteration
//! 5. Generate a new identity and open a session for it
//! 6. In paired mode, advertise and browse again

use std::mem;

use tracing::info;

use super::Coordinator;
use crate::{
    action::{JoinFailure, LobbyAction, Notification},
    config::OperatingMode,
    env::Environment,
    identity::PeerIdentity,
    session::TransportSession,
};

impl<E: Environment> Coordinator<E> {
    /// Leave the lobby. Remote peers learn about it from the disconnect.
    pub(super) fn leave(&mut self) -> Vec<LobbyAction> {
        info!(peer = %self.local, members = self.lobby.len(), "leaving lobby");
        self.reset()
    }

    pub(super) fn reset(&mut self) -> Vec<LobbyAction> {
        let previous = self.local.clone();
        let current = PeerIdentity::generate(&self.env);

        let old_session = mem::replace(&mut self.session, TransportSession::new(current.clone()));
        let mut actions = vec![old_session.close()];
        actions.extend(self.discovery.stop_advertising());
        actions.extend(self.discovery.stop_browsing());

        self.pending.clear();
        for handshake in mem::take(&mut self.handshakes).into_values() {
            if handshake.state.is_joining() {
                actions.push(LobbyAction::Notify(Notification::JoinFailed {
                    peer: handshake.peer,
                    reason: JoinFailure::Reset,
                }));
            }
        }

        self.discovery.next_generation();
        self.lobby.clear();
        self.local = current.clone();

        info!(%previous, %current, iteration = self.discovery.iteration(), "session reset");
        actions.push(LobbyAction::OpenSession { identity: current.clone() });
        actions.push(LobbyAction::Notify(Notification::IdentityChanged { previous, current }));

        if self.config.mode == OperatingMode::Paired {
            actions.extend(self.discovery.advertise(&self.local, None));
            actions.extend(self.discovery.browse(&self.local));
        }

        actions
    }
}
