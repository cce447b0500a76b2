//! Application layer for meshlobby
//!
//! Generic async runtime that drives the sans-IO coordinator against a
//! platform transport, so the same orchestration runs in production and in
//! tests with a scripted transport.
//!
//! # Components
//!
//! - [`Driver`]: Trait for platform-specific transport I/O
//! - [`Runtime`]: Single-writer event loop owning the coordinator
//! - [`LobbyHandle`]: Cloneable command, snapshot and notification handle
//! - [`RuntimeConfig`]: Tick interval and channel capacities

mod config;
mod driver;
mod handle;
mod runtime;

pub use config::RuntimeConfig;
pub use driver::Driver;
pub use handle::LobbyHandle;
pub use runtime::Runtime;
