//! Environment abstraction.
//!
//! State machines never read the clock or the OS RNG directly. Production code
//! passes [`SystemEnv`]; tests and simulations pass a deterministic
//! implementation with a virtual clock and a seeded RNG.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use rand::RngCore;

/// Source of time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Instant;

    /// Wait for `duration` to elapse.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// Wall clock, tokio timers and the thread-local OS-seeded RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}
