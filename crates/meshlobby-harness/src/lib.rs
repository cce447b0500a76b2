//! Deterministic simulation harness for meshlobby protocol testing.
//!
//! In-memory implementations of the environment and the mesh transport for
//! deterministic, reproducible testing of discovery and the lobby handshake.
//!
//! - [`SimEnv`]: virtual clock and seeded RNG
//! - [`scenario::World`]: simulated mesh that routes actions between
//!   coordinators
//! - [`scenario::Scenario`]: declarative scenarios with mandatory oracles
//! - [`model`]: reference model for model-based property tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod scenario;
pub mod sim_env;

pub use model::{ModelMesh, ModelPeer, NodeIndex, Operation, Outcome};
pub use scenario::{Scenario, World, oracle};
pub use sim_env::SimEnv;
