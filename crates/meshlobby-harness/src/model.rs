//! Reference model for model-based testing.
//!
//! Describes what a settled mesh should look like after a sequence of
//! operations, with none of the handshake machinery. Every operation is
//! assumed to run until the mesh is quiet before the next one starts, so a
//! join either completes on both sides or is a no-op.

use std::collections::BTreeSet;

/// Index of a node in the model.
pub type NodeIndex = u8;

/// Operations applied to both the model and the real mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Start advertising and browsing
    Host {
        /// Acting node
        node: NodeIndex,
    },
    /// Join `target`'s current identity
    Join {
        /// Acting node
        node: NodeIndex,
        /// Node to join
        target: NodeIndex,
    },
    /// Leave the lobby, resetting identity
    Leave {
        /// Acting node
        node: NodeIndex,
    },
    /// Withdraw the advertisement
    StopAdvertising {
        /// Acting node
        node: NodeIndex,
    },
    /// Move the clock and tick everyone
    AdvanceTime {
        /// Milliseconds to advance
        millis: u16,
    },
}

impl Operation {
    /// Same operation with node indices wrapped into `0..num_nodes`.
    #[must_use]
    pub fn clamp(self, num_nodes: usize) -> Self {
        let wrap = |node: NodeIndex| (usize::from(node) % num_nodes.max(1)) as NodeIndex;
        match self {
            Self::Host { node } => Self::Host { node: wrap(node) },
            Self::Join { node, target } => Self::Join { node: wrap(node), target: wrap(target) },
            Self::Leave { node } => Self::Leave { node: wrap(node) },
            Self::StopAdvertising { node } => Self::StopAdvertising { node: wrap(node) },
            Self::AdvanceTime { millis } => Self::AdvanceTime { millis },
        }
    }
}

/// Whether an operation changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// State changed
    Applied,
    /// The operation was a no-op
    Ignored,
}

/// One identity of one node: the node and how many times it has reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelPeer {
    /// Owning node
    pub node: NodeIndex,
    /// Number of resets before this identity was created
    pub generation: usize,
}

#[derive(Debug, Clone, Default)]
struct ModelNode {
    generation: usize,
    advertising: bool,
    browsing: bool,
    members: BTreeSet<ModelPeer>,
}

/// Reference mesh. All nodes use the default paired configuration.
#[derive(Debug, Clone)]
pub struct ModelMesh {
    nodes: Vec<ModelNode>,
}

impl ModelMesh {
    /// Mesh of `num_nodes` idle nodes.
    pub fn new(num_nodes: usize) -> Self {
        Self { nodes: vec![ModelNode::default(); num_nodes] }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the mesh has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: Operation) -> Outcome {
        match op {
            Operation::Host { node } => {
                let Some(n) = self.nodes.get_mut(usize::from(node)) else {
                    return Outcome::Ignored;
                };
                if n.advertising && n.browsing {
                    return Outcome::Ignored;
                }
                n.advertising = true;
                n.browsing = true;
                Outcome::Applied
            },
            Operation::Join { node, target } => self.join(node, target),
            Operation::Leave { node } => {
                let Some(n) = self.nodes.get_mut(usize::from(node)) else {
                    return Outcome::Ignored;
                };
                n.generation += 1;
                n.members.clear();
                n.advertising = true;
                n.browsing = true;
                Outcome::Applied
            },
            Operation::StopAdvertising { node } => {
                let Some(n) = self.nodes.get_mut(usize::from(node)) else {
                    return Outcome::Ignored;
                };
                if !n.advertising {
                    return Outcome::Ignored;
                }
                n.advertising = false;
                Outcome::Applied
            },
            Operation::AdvanceTime { .. } => Outcome::Applied,
        }
    }

    fn join(&mut self, node: NodeIndex, target: NodeIndex) -> Outcome {
        if !self.discovered(node).contains(&self.peer(target)) {
            return Outcome::Ignored;
        }

        // Both indices are in range once the target has been discovered
        let (j, h) = (usize::from(node), usize::from(target));
        let joiner = self.peer(node);
        let host = self.peer(target);
        if self.nodes[j].members.contains(&host) {
            return Outcome::Ignored;
        }

        self.nodes[j].advertising = true;
        self.nodes[j].members.insert(host);
        self.nodes[h].members.insert(joiner);
        Outcome::Applied
    }

    /// Current identity of `node`.
    pub fn peer(&self, node: NodeIndex) -> ModelPeer {
        let generation = self.nodes.get(usize::from(node)).map_or(0, |n| n.generation);
        ModelPeer { node, generation }
    }

    /// Identities `node` should have discovered.
    pub fn discovered(&self, node: NodeIndex) -> BTreeSet<ModelPeer> {
        let Some(observer) = self.nodes.get(usize::from(node)) else {
            return BTreeSet::new();
        };
        if !observer.browsing {
            return BTreeSet::new();
        }

        self.nodes
            .iter()
            .enumerate()
            .filter(|&(i, other)| i != usize::from(node) && other.advertising)
            .map(|(i, other)| ModelPeer { node: i as NodeIndex, generation: other.generation })
            .collect()
    }

    /// Lobby members of `node`.
    pub fn members(&self, node: NodeIndex) -> BTreeSet<ModelPeer> {
        self.nodes.get(usize::from(node)).map(|n| n.members.clone()).unwrap_or_default()
    }
}
