//! Seeded lobby simulation.
//!
//! Every peer hosts, the topology decides who joins whom, and an optional
//! peer leaves once the lobbies have formed. The settled mesh is checked
//! against the global invariants before a report is produced.

use meshlobby_core::{CoordinatorConfig, LobbyEvent, PeerIdentity};
use meshlobby_harness::{World, oracle};
use thiserror::Error;
use tracing::{debug, info};

/// Simulation failures.
#[derive(Debug, Error)]
pub enum SimError {
    /// A coordinator rejected its configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `--leave` named a peer that does not exist.
    #[error("peer {index} does not exist in a mesh of {peers}")]
    NoSuchPeer {
        /// Requested index
        index: u8,
        /// Number of peers
        peers: u8,
    },

    /// The mesh kept delivering without settling.
    #[error("mesh did not settle: {0}")]
    Mesh(String),

    /// The settled mesh broke a global invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Who joins whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Topology {
    /// Everyone joins peer 0, one at a time
    Star,
    /// Each peer joins the one before it
    Chain,
    /// Neighbouring pairs join each other at the same time
    Cross,
}

impl Topology {
    /// Join rounds as `(joiner, host)` indices. Joins in one round are
    /// issued together before the mesh settles.
    fn rounds(self, peers: usize) -> Vec<Vec<(usize, usize)>> {
        match self {
            Self::Star => (1..peers).map(|i| vec![(i, 0)]).collect(),
            Self::Chain => (1..peers).map(|i| vec![(i, i - 1)]).collect(),
            Self::Cross => {
                (0..peers / 2).map(|k| vec![(2 * k, 2 * k + 1), (2 * k + 1, 2 * k)]).collect()
            },
        }
    }
}

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of peers
    pub peers: u8,
    /// RNG seed for identities
    pub seed: u64,
    /// Join topology
    pub topology: Topology,
    /// Configuration shared by every peer
    pub lobby: CoordinatorConfig,
    /// Peer that leaves after the lobbies form
    pub leave: Option<u8>,
}

/// Final state of one peer.
#[derive(Debug, Clone)]
pub struct PeerReport {
    /// Simulation name
    pub name: String,
    /// Identity at the end of the run
    pub identity: PeerIdentity,
    /// Names of lobby members
    pub members: Vec<String>,
    /// Notifications observed over the run
    pub notifications: usize,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Report {
    /// Total deliveries made by the mesh
    pub deliveries: usize,
    /// One entry per peer, in index order
    pub peers: Vec<PeerReport>,
}

impl Report {
    /// Log the report at `info`.
    pub fn log(&self) {
        for peer in &self.peers {
            info!(
                peer = %peer.name,
                identity = %peer.identity,
                members = ?peer.members,
                notifications = peer.notifications,
                "final lobby"
            );
        }
        info!(deliveries = self.deliveries, peers = self.peers.len(), "simulation complete");
    }
}

/// Run a simulation to completion.
pub fn run(config: &SimConfig) -> Result<Report, SimError> {
    if let Some(index) = config.leave
        && index >= config.peers
    {
        return Err(SimError::NoSuchPeer { index, peers: config.peers });
    }

    let names: Vec<String> = (0..config.peers).map(|i| format!("peer-{i}")).collect();
    let mut world = World::new(config.seed);
    let mut deliveries = 0;

    for name in &names {
        world.add_node(name.as_str(), config.lobby.clone()).map_err(SimError::Config)?;
        world.host(name);
    }
    deliveries += world.run_until_idle().map_err(SimError::Mesh)?;
    info!(peers = names.len(), seed = config.seed, "mesh hosted");

    for (round, joins) in config.topology.rounds(names.len()).into_iter().enumerate() {
        for (joiner, host) in joins {
            debug!(round, joiner = %names[joiner], host = %names[host], "join");
            world.join(&names[joiner], &names[host]).map_err(SimError::Mesh)?;
        }
        deliveries += world.run_until_idle().map_err(SimError::Mesh)?;
    }

    // Let every handshake deadline pass
    deliveries += world.advance(config.lobby.join_timeout).map_err(SimError::Mesh)?;

    if let Some(index) = config.leave {
        let name = &names[usize::from(index)];
        info!(peer = %name, "leaving");
        world.command(name, LobbyEvent::Leave);
        deliveries += world.run_until_idle().map_err(SimError::Mesh)?;
    }

    let invariants = oracle::all_of(vec![
        oracle::no_errors(),
        oracle::no_pending_joins(),
        oracle::no_self_discovery(),
        oracle::unique_discovery(),
        oracle::mutual_membership(),
    ]);
    invariants(&world).map_err(SimError::Invariant)?;

    let peers = names
        .iter()
        .filter_map(|name| {
            let node = world.node(name)?;
            Some(PeerReport {
                name: name.clone(),
                identity: node.identity().clone(),
                members: world.member_names(name).unwrap_or_default(),
                notifications: node.notifications().len(),
            })
        })
        .collect();

    Ok(Report { deliveries, peers })
}
