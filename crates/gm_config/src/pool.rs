use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sizing of the worker pool that runs asynchronous requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of runtime threads, also the number of requests in flight at once
    #[serde(default = "crate::defaults::default_workers")]
    pub workers: usize,
    /// Requests waiting for a worker before new submissions are refused
    #[serde(default = "crate::defaults::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "crate::defaults::default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl PoolConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: crate::defaults::default_workers(),
            queue_capacity: crate::defaults::default_queue_capacity(),
            shutdown_grace_ms: crate::defaults::default_shutdown_grace_ms(),
        }
    }
}
