//! Runtime configuration.

use std::time::Duration;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How often the coordinator is ticked for deadline checks
    pub tick_interval: Duration,
    /// Capacity of the command channel shared by all handles
    pub command_buffer: usize,
    /// Notifications buffered per subscriber before the slowest one lags
    pub notification_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            command_buffer: 32,
            notification_buffer: 64,
        }
    }
}
