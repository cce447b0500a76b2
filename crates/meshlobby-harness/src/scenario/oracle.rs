//! Reusable oracle helpers.
//!
//! Each helper checks one global property of the final [`World`] and reports
//! the first violation it finds.

use std::collections::BTreeSet;

use crate::scenario::{OracleFn, World};

/// Combine oracles; all must pass.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// No coordinator rejected an event.
pub fn no_errors() -> OracleFn {
    Box::new(|world: &World| {
        for (name, node) in world.nodes() {
            if let Some(error) = node.errors().first() {
                return Err(format!("{name} rejected an event: {error}"));
            }
        }
        Ok(())
    })
}

/// No peer has discovered itself, under any identity it has held.
pub fn no_self_discovery() -> OracleFn {
    Box::new(|world: &World| {
        for (name, node) in world.nodes() {
            let own: BTreeSet<_> = node.identities().iter().map(|i| i.id()).collect();
            if node.coordinator().discovery().peers().any(|p| own.contains(&p.identity.id())) {
                return Err(format!("{name} discovered itself"));
            }
        }
        Ok(())
    })
}

/// Every discovered peer appears once, by id and by label.
pub fn unique_discovery() -> OracleFn {
    Box::new(|world: &World| {
        for (name, node) in world.nodes() {
            let mut labels = BTreeSet::new();
            for peer in node.coordinator().discovery().peers() {
                if !labels.insert(peer.identity.label()) {
                    return Err(format!("{name} discovered {} twice", peer.identity));
                }
            }
        }
        Ok(())
    })
}

/// No join attempt is still waiting for a connection.
pub fn no_pending_joins() -> OracleFn {
    Box::new(|world: &World| {
        for (name, node) in world.nodes() {
            if node.coordinator().is_joining() {
                return Err(format!("{name} still has a pending join"));
            }
        }
        Ok(())
    })
}

/// `node`'s lobby members are exactly the named peers.
pub fn members(node: &str, expected: &[&str]) -> OracleFn {
    let node = node.to_owned();
    let mut expected: Vec<String> = expected.iter().map(|&name| name.to_owned()).collect();
    expected.sort();

    Box::new(move |world: &World| {
        let mut actual =
            world.member_names(&node).ok_or_else(|| format!("{node} not found"))?;
        actual.sort();
        if actual != expected {
            return Err(format!("{node} members: expected {expected:?}, got {actual:?}"));
        }
        Ok(())
    })
}

/// Membership between current identities is symmetric.
///
/// Members recorded under an identity that has since been reset are ignored;
/// the other side has moved on and cannot reciprocate.
pub fn mutual_membership() -> OracleFn {
    Box::new(|world: &World| {
        for (name, node) in world.nodes() {
            for member in node.members() {
                let Some(other) = world.name_of(member.id()) else {
                    return Err(format!("{name} has member {member} that no peer owns"));
                };
                let Some(other_node) = world.node(other) else {
                    continue;
                };
                if other_node.identity().id() != member.id() {
                    continue;
                }
                if !other_node.coordinator().lobby().contains(node.identity().id()) {
                    return Err(format!("{name} lists {other} as a member but not vice versa"));
                }
            }
        }
        Ok(())
    })
}
