//! Broadcast configuration.

use std::time::Duration;

/// Tuning for the registry and dispatcher.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Updates buffered per subscription before new ones are dropped.
    pub queue_capacity: usize,
    /// How long `Broadcaster::stats` waits for the dispatcher to answer.
    pub rpc_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            rpc_timeout: Duration::from_secs(5),
        }
    }
}

impl BroadcastConfig {
    /// Set the per-subscription queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the stats RPC timeout.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}
