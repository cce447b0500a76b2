//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use meshlobby_core::{CoordinatorConfig, LobbyEvent};

use crate::scenario::{OracleFn, World};

#[derive(Debug, Clone)]
enum Step {
    Command { node: String, event: LobbyEvent },
    Join { node: String, target: String },
    CrossJoin { a: String, b: String },
    StaggeredJoin { a: String, b: String, after: usize },
    Advance(Duration),
}

/// Scenario builder.
///
/// Construct a scenario by adding peers and the steps they take. Each step is
/// followed by delivering every resulting event until the mesh is quiet.
/// Must call `.oracle()` to get a `RunnableScenario` that can be executed.
pub struct Scenario {
    name: String,
    seed: u64,
    peers: Vec<(String, CoordinatorConfig)>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), seed: 0, peers: Vec::new(), steps: Vec::new() }
    }

    /// Seed for identity generation.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Add a peer with default configuration.
    pub fn peer(self, name: impl Into<String>) -> Self {
        self.peer_with_config(name, CoordinatorConfig::default())
    }

    /// Add a peer with custom configuration.
    pub fn peer_with_config(mut self, name: impl Into<String>, config: CoordinatorConfig) -> Self {
        self.peers.push((name.into(), config));
        self
    }

    /// Deliver an arbitrary event to a peer.
    pub fn event(mut self, node: impl Into<String>, event: LobbyEvent) -> Self {
        self.steps.push(Step::Command { node: node.into(), event });
        self
    }

    /// Start advertising and browsing.
    pub fn host(self, node: impl Into<String>) -> Self {
        self.event(node, LobbyEvent::Host)
    }

    /// Join `target`'s lobby, addressing its identity at the time of the step.
    pub fn join(mut self, node: impl Into<String>, target: impl Into<String>) -> Self {
        self.steps.push(Step::Join { node: node.into(), target: target.into() });
        self
    }

    /// Have `a` and `b` join each other before either side sees the other's
    /// invitation request.
    pub fn cross_join(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.steps.push(Step::CrossJoin { a: a.into(), b: b.into() });
        self
    }

    /// Have `a` join `b`, then have `b` join `a` once `after` events of the
    /// first attempt have been delivered.
    pub fn staggered_join(
        mut self,
        a: impl Into<String>,
        b: impl Into<String>,
        after: usize,
    ) -> Self {
        self.steps.push(Step::StaggeredJoin { a: a.into(), b: b.into(), after });
        self
    }

    /// Leave the lobby.
    pub fn leave(self, node: impl Into<String>) -> Self {
        self.event(node, LobbyEvent::Leave)
    }

    /// Reset the session.
    pub fn reset(self, node: impl Into<String>) -> Self {
        self.event(node, LobbyEvent::Reset)
    }

    /// Stop advertising.
    pub fn stop_advertising(self, node: impl Into<String>) -> Self {
        self.event(node, LobbyEvent::StopAdvertising)
    }

    /// Advance the virtual clock and tick every peer.
    pub fn advance(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Advance(duration));
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Creates every peer, settles their initial sessions, then runs each step
    /// to quiescence. The oracle is invoked on the final world.
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, seed, peers, steps } = self.scenario;
        let context = |e: String| format!("Scenario '{name}': {e}");

        let mut world = World::new(seed);
        for (peer, config) in peers {
            world.add_node(peer, config).map_err(context)?;
        }
        world.run_until_idle().map_err(context)?;

        for step in steps {
            match step {
                Step::Command { node, event } => {
                    if world.node(&node).is_none() {
                        return Err(context(format!("peer {node} not found")));
                    }
                    world.command(&node, event);
                    world.run_until_idle().map_err(context)?;
                },
                Step::Join { node, target } => {
                    world.join(&node, &target).map_err(context)?;
                    world.run_until_idle().map_err(context)?;
                },
                Step::CrossJoin { a, b } => {
                    world.join(&a, &b).map_err(context)?;
                    world.join(&b, &a).map_err(context)?;
                    world.run_until_idle().map_err(context)?;
                },
                Step::StaggeredJoin { a, b, after } => {
                    world.join(&a, &b).map_err(context)?;
                    world.run_steps(after);
                    world.join(&b, &a).map_err(context)?;
                    world.run_until_idle().map_err(context)?;
                },
                Step::Advance(duration) => {
                    world.advance(duration).map_err(context)?;
                },
            }
        }

        (self.oracle)(&world).map_err(context)
    }
}
