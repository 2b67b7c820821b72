use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_channel_capacity() -> usize {
    1024
}

fn default_reconnect_base_ms() -> u64 {
    250
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

/// Settings for the order book store and its ingestion workers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketDataConfig {
    /// Snapshots older than this are pruned.
    pub staleness_ms: u64,
    pub prune_interval_ms: u64,
    /// Capacity of the store's event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl MarketDataConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    /// Delay before resubscription attempt `attempt` (0-based): doubles each time, capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(20);
        let delay = self
            .reconnect_base_ms
            .saturating_mul(factor)
            .min(self.reconnect_max_ms);
        Duration::from_millis(delay)
    }
}
