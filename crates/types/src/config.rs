//! Finalization configuration.

use std::time::Duration;

/// Tunables for the finalization subsystem.
///
/// `size` and `threshold` are consensus-critical and must match across the
/// network; the remaining fields are local node tunables.
#[derive(Debug, Clone)]
pub struct FinalizationConfig {
    /// Expected number of votes selected per step by sortition.
    pub size: u64,
    /// Vote weight required for consensus in the counting aggregators.
    pub threshold: u64,
    /// Retention window for the short-lived message dedup cache.
    pub short_lived_cache_message_duration: Duration,
    /// Maximum total serialized size of a message synchronization response.
    pub message_synchronization_max_response_size: u64,
    /// Upper bound on the number of hashes in a chain-proposal message.
    pub max_hashes_per_point: u32,
    /// How long the orchestrator stays in the Propose-Chain stage before
    /// timing out.
    pub propose_message_stage_duration: Duration,
    /// Timeout for every other stage.
    pub aggregation_stage_max_duration: Duration,
}

impl FinalizationConfig {
    /// Create a configuration with the given consensus parameters and
    /// default local tunables.
    pub fn new(size: u64, threshold: u64) -> Self {
        Self {
            size,
            threshold,
            short_lived_cache_message_duration: Duration::from_secs(60),
            message_synchronization_max_response_size: 10 * 1024 * 1024,
            max_hashes_per_point: 256,
            propose_message_stage_duration: Duration::from_secs(30),
            aggregation_stage_max_duration: Duration::from_secs(60),
        }
    }

    /// Set the dedup cache retention window.
    pub fn with_short_lived_cache_message_duration(mut self, duration: Duration) -> Self {
        self.short_lived_cache_message_duration = duration;
        self
    }

    /// Set the synchronization response size cap.
    pub fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.message_synchronization_max_response_size = bytes;
        self
    }

    /// Set the chain-proposal hash bound.
    pub fn with_max_hashes_per_point(mut self, max_hashes: u32) -> Self {
        self.max_hashes_per_point = max_hashes;
        self
    }

    /// Set the Propose-Chain stage timeout.
    pub fn with_propose_message_stage_duration(mut self, duration: Duration) -> Self {
        self.propose_message_stage_duration = duration;
        self
    }

    /// Set the aggregation stage timeout.
    pub fn with_aggregation_stage_max_duration(mut self, duration: Duration) -> Self {
        self.aggregation_stage_max_duration = duration;
        self
    }
}
