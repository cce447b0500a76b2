//! Fuzz target for inbound traffic at the coordinator.
//!
//! A connected peer sends arbitrary messages and invitation contexts. The
//! coordinator must answer with actions or a typed error and every invitation
//! must get exactly one response.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use meshlobby_core::{
    ConnectionState, Coordinator, CoordinatorConfig, DecisionEvent, DecisionId, LobbyAction,
    LobbyEvent, PeerId, PeerIdentity, SystemEnv, TransportEvent,
};

fuzz_target!(|data: &[u8]| {
    let Ok(mut coordinator) = Coordinator::new(SystemEnv, CoordinatorConfig::default()) else {
        return;
    };
    let peer = PeerIdentity::new(PeerId::from_u128(7), "fuzz");
    let payload = Bytes::copy_from_slice(data);

    let actions = coordinator
        .handle(LobbyEvent::Decision(DecisionEvent::InvitationReceived {
            decision: DecisionId(1),
            from: peer.clone(),
            context: payload.clone(),
        }))
        .expect("invitations never error");
    let responses = actions
        .iter()
        .filter(|a| matches!(a, LobbyAction::RespondToInvitation { decision: DecisionId(1), .. }))
        .count();
    assert_eq!(responses, 1);

    let _ = coordinator.handle(LobbyEvent::Transport(TransportEvent::StateChanged {
        peer: peer.clone(),
        state: ConnectionState::Connected,
    }));
    let _ = coordinator
        .handle(LobbyEvent::Transport(TransportEvent::MessageReceived { from: peer, payload }));
});
