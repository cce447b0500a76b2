//! Advertising and browsing.
//!
//! Tracks the advertiser and browser as explicit state machines rather than
//! optional handles, and owns the discovered-peer set.
//!
//! ```text
//! ┌───────────────┐  start   ┌────────┐  stop/failure  ┌─────────┐
//! │ Uninitialized │─────────>│ Active │───────────────>│ Stopped │
//! └───────────────┘          └────────┘<───────────────└─────────┘
//!                                          start (retry)
//! ```

use std::collections::BTreeMap;

use meshlobby_proto::DiscoveryInfo;
use tracing::{debug, info, warn};

use crate::{
    action::{LobbyAction, Notification, Service},
    identity::{PeerId, PeerIdentity},
};

/// Lifecycle of an advertiser or browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    /// Never started
    #[default]
    Uninitialized,
    /// Running
    Active,
    /// Stopped explicitly or after a start failure
    Stopped,
}

/// A peer observed through browsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Advertised identity
    pub identity: PeerIdentity,
    /// Advertisement metadata
    pub info: DiscoveryInfo,
}

/// Discovery state machine.
#[derive(Debug, Clone)]
pub struct Discovery {
    service_tag: String,
    advertiser: ServiceState,
    browser: ServiceState,
    iteration: u64,
    peers: BTreeMap<PeerId, DiscoveredPeer>,
}

impl Discovery {
    /// Create with both handles uninitialized and iteration 1.
    pub fn new(service_tag: impl Into<String>) -> Self {
        Self {
            service_tag: service_tag.into(),
            advertiser: ServiceState::Uninitialized,
            browser: ServiceState::Uninitialized,
            iteration: 1,
            peers: BTreeMap::new(),
        }
    }

    /// Advertiser state.
    #[must_use]
    pub fn advertiser(&self) -> ServiceState {
        self.advertiser
    }

    /// Browser state.
    #[must_use]
    pub fn browser(&self) -> ServiceState {
        self.browser
    }

    /// Whether the advertiser is running.
    pub fn is_advertising(&self) -> bool {
        self.advertiser == ServiceState::Active
    }

    /// Whether the browser is running.
    pub fn is_browsing(&self) -> bool {
        self.browser == ServiceState::Active
    }

    /// Current reset generation.
    #[must_use]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Metadata advertised when the caller supplies none.
    pub fn default_info(&self) -> DiscoveryInfo {
        DiscoveryInfo::with_iteration(self.iteration)
    }

    /// Look up a discovered peer.
    pub fn get(&self, peer: PeerId) -> Option<&DiscoveredPeer> {
        self.peers.get(&peer)
    }

    /// Discovered peers, ordered by id.
    pub fn peers(&self) -> impl Iterator<Item = &DiscoveredPeer> {
        self.peers.values()
    }

    /// Start advertising `local`. No-op while already advertising.
    pub fn advertise(
        &mut self,
        local: &PeerIdentity,
        info: Option<DiscoveryInfo>,
    ) -> Vec<LobbyAction> {
        if self.is_advertising() {
            return Vec::new();
        }

        let info = info.unwrap_or_else(|| self.default_info());
        self.advertiser = ServiceState::Active;
        info!(peer = %local, iteration = ?info.iteration(), "advertising");

        vec![LobbyAction::StartAdvertising {
            identity: local.clone(),
            service_tag: self.service_tag.clone(),
            info,
        }]
    }

    /// Start browsing. No-op while already browsing.
    pub fn browse(&mut self, local: &PeerIdentity) -> Vec<LobbyAction> {
        if self.is_browsing() {
            return Vec::new();
        }

        self.browser = ServiceState::Active;
        info!(peer = %local, "browsing");

        vec![LobbyAction::StartBrowsing {
            identity: local.clone(),
            service_tag: self.service_tag.clone(),
        }]
    }

    /// Stop advertising. No-op unless advertising.
    pub fn stop_advertising(&mut self) -> Vec<LobbyAction> {
        if !self.is_advertising() {
            return Vec::new();
        }

        self.advertiser = ServiceState::Stopped;
        debug!("stopped advertising");
        vec![LobbyAction::StopAdvertising]
    }

    /// Stop browsing. No-op unless browsing.
    pub fn stop_browsing(&mut self) -> Vec<LobbyAction> {
        if !self.is_browsing() {
            return Vec::new();
        }

        self.browser = ServiceState::Stopped;
        debug!("stopped browsing");
        vec![LobbyAction::StopBrowsing]
    }

    /// Record that a handle failed to start.
    ///
    /// The handle moves to [`ServiceState::Stopped`] so a later start retries.
    pub fn start_failed(&mut self, service: Service, reason: String) -> Vec<LobbyAction> {
        match service {
            Service::Advertising => self.advertiser = ServiceState::Stopped,
            Service::Browsing => self.browser = ServiceState::Stopped,
        }

        warn!(%service, %reason, "failed to start");
        vec![LobbyAction::Notify(Notification::ServiceFailed { service, reason })]
    }

    /// Handle an advertisement.
    ///
    /// Ignores the local peer and anything already known, matching on either
    /// id or label.
    pub fn peer_found(
        &mut self,
        local: &PeerIdentity,
        identity: PeerIdentity,
        info: DiscoveryInfo,
    ) -> Vec<LobbyAction> {
        if identity == *local || identity.label() == local.label() {
            return Vec::new();
        }

        let known = self
            .peers
            .values()
            .any(|p| p.identity == identity || p.identity.label() == identity.label());
        if known {
            return Vec::new();
        }

        debug!(peer = %identity, iteration = ?info.iteration(), "found peer");
        let peer = DiscoveredPeer { identity, info };
        self.peers.insert(peer.identity.id(), peer.clone());

        vec![LobbyAction::Notify(Notification::PeerDiscovered { peer })]
    }

    /// Handle an advertisement disappearing. Unknown peers are ignored.
    pub fn peer_lost(&mut self, identity: &PeerIdentity) -> Vec<LobbyAction> {
        match self.peers.remove(&identity.id()) {
            Some(peer) => {
                debug!(peer = %peer.identity, "lost peer");
                vec![LobbyAction::Notify(Notification::PeerLost { peer: peer.identity })]
            },
            None => Vec::new(),
        }
    }

    /// Forget all discovered peers and advance to the next generation.
    pub(crate) fn next_generation(&mut self) {
        self.peers.clear();
        self.iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn peer(id: u128, label: &str) -> PeerIdentity {
        PeerIdentity::new(PeerId::from_u128(id), label)
    }

    #[test]
    fn advertise_is_idempotent() {
        let local = peer(1, "local");
        let mut discovery = Discovery::new("meshlobby");

        let actions = discovery.advertise(&local, None);
        assert_eq!(
            actions,
            vec![LobbyAction::StartAdvertising {
                identity: local.clone(),
                service_tag: "meshlobby".into(),
                info: DiscoveryInfo::with_iteration(1),
            }]
        );
        assert!(discovery.is_advertising());

        assert!(discovery.advertise(&local, None).is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let local = peer(1, "local");
        let mut discovery = Discovery::new("meshlobby");

        assert!(discovery.stop_browsing().is_empty());
        assert_eq!(discovery.browser(), ServiceState::Uninitialized);

        discovery.browse(&local);
        assert_eq!(discovery.stop_browsing(), vec![LobbyAction::StopBrowsing]);
        assert!(discovery.stop_browsing().is_empty());
        assert_eq!(discovery.browser(), ServiceState::Stopped);
    }

    #[test]
    fn failed_start_can_be_retried() {
        let local = peer(1, "local");
        let mut discovery = Discovery::new("meshlobby");

        discovery.advertise(&local, None);
        let actions = discovery.start_failed(Service::Advertising, "radio off".into());
        assert!(matches!(
            actions.as_slice(),
            [LobbyAction::Notify(Notification::ServiceFailed { service: Service::Advertising, .. })]
        ));
        assert_eq!(discovery.advertiser(), ServiceState::Stopped);

        assert_eq!(discovery.advertise(&local, None).len(), 1);
        assert!(discovery.is_advertising());
    }

    #[test]
    fn filters_self_by_id_and_label() {
        let local = peer(1, "local");
        let mut discovery = Discovery::new("meshlobby");

        assert!(discovery.peer_found(&local, local.clone(), DiscoveryInfo::new()).is_empty());
        assert!(discovery.peer_found(&local, peer(2, "local"), DiscoveryInfo::new()).is_empty());
        assert_eq!(discovery.peers().count(), 0);
    }

    #[test]
    fn found_is_idempotent() {
        let local = peer(1, "local");
        let mut discovery = Discovery::new("meshlobby");

        assert_eq!(discovery.peer_found(&local, peer(2, "bob"), DiscoveryInfo::new()).len(), 1);
        assert!(discovery.peer_found(&local, peer(2, "bob"), DiscoveryInfo::new()).is_empty());
        assert!(discovery.peer_found(&local, peer(3, "bob"), DiscoveryInfo::new()).is_empty());
        assert_eq!(discovery.peers().count(), 1);
    }

    #[test]
    fn lost_then_found_is_observed_in_order() {
        let local = peer(1, "local");
        let bob = peer(2, "bob");
        let mut discovery = Discovery::new("meshlobby");

        discovery.peer_found(&local, bob.clone(), DiscoveryInfo::new());
        assert_eq!(
            discovery.peer_lost(&bob),
            vec![LobbyAction::Notify(Notification::PeerLost { peer: bob.clone() })]
        );
        assert!(discovery.peer_lost(&bob).is_empty());
        assert_eq!(discovery.peer_found(&local, bob.clone(), DiscoveryInfo::new()).len(), 1);
        assert!(discovery.get(bob.id()).is_some());
    }

    #[test]
    fn next_generation_clears_and_increments() {
        let local = peer(1, "local");
        let mut discovery = Discovery::new("meshlobby");
        discovery.peer_found(&local, peer(2, "bob"), DiscoveryInfo::new());

        discovery.next_generation();
        assert_eq!(discovery.peers().count(), 0);
        assert_eq!(discovery.iteration(), 2);
        assert_eq!(discovery.default_info().iteration(), Some(2));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Found(u128, u8),
        Lost(u128, u8),
        NextGeneration,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0..6u128, 0..4u8).prop_map(|(id, label)| Op::Found(id, label)),
            2 => (0..6u128, 0..4u8).prop_map(|(id, label)| Op::Lost(id, label)),
            1 => Just(Op::NextGeneration),
        ]
    }

    proptest! {
        #[test]
        fn discovered_peers_stay_unique(ops in prop::collection::vec(op(), 1..60)) {
            let local = peer(0, "n0");
            let mut discovery = Discovery::new("meshlobby");

            for op in ops {
                match op {
                    Op::Found(id, label) => {
                        let found = peer(id, &format!("n{label}"));
                        discovery.peer_found(&local, found, DiscoveryInfo::new());
                    },
                    Op::Lost(id, label) => {
                        discovery.peer_lost(&peer(id, &format!("n{label}")));
                    },
                    Op::NextGeneration => discovery.next_generation(),
                }

                let peers: Vec<_> = discovery.peers().map(|p| p.identity.clone()).collect();
                for (i, a) in peers.iter().enumerate() {
                    prop_assert_ne!(a.id(), local.id());
                    prop_assert_ne!(a.label(), local.label());
                    for b in &peers[i + 1..] {
                        prop_assert_ne!(a.id(), b.id());
                        prop_assert_ne!(a.label(), b.label());
                    }
                }
            }
        }
    }
}
