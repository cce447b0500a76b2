//! Scenario testing framework.
//!
//! Scenarios declare peers and the steps they take, run them against an
//! in-memory mesh, and must end with an oracle that verifies the final world.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use world::{Delivery, MAX_DELIVERIES, Node, World};

/// Verifies the final world state. Returns a description of the first
/// violation.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
