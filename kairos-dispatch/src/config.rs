use serde::{Deserialize, Serialize};

/// Configuration for an [`EventDispatcher`](crate::EventDispatcher).
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Strict upper bound on queued events.
    pub max_queue_size: usize,

    /// Worker threads dequeuing and invoking handlers concurrently.
    pub num_workers: usize,

    /// Shed lower-priority events when the queue load crosses `backpressure_threshold`.
    pub backpressure_enabled: bool,

    /// Queue load (`len / capacity`) at which probabilistic shedding starts. The shed
    /// probability rises linearly from 0.0 at the threshold to 1.0 at a full queue.
    pub backpressure_threshold: f64,

    /// Report unhealthy (without stopping) when the sliding-window drop rate exceeds
    /// `unhealthy_drop_rate`.
    pub graceful_degradation_enabled: bool,

    /// Sliding-window drop rate above which `is_healthy()` returns false.
    pub unhealthy_drop_rate: f64,

    /// How long a worker blocks on an empty queue before re-checking the stop flag.
    pub worker_poll_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            num_workers: 4,
            backpressure_enabled: true,
            backpressure_threshold: 0.8,
            graceful_degradation_enabled: true,
            unhealthy_drop_rate: 0.05,
            worker_poll_interval_ms: 100,
        }
    }
}

impl DispatcherConfig {
    /// Validate the configuration, called once at `start()`.
    pub fn validate(&self) -> Result<(), crate::error::DispatchError> {
        if self.max_queue_size == 0 {
            return Err(crate::error::DispatchError::InvalidConfig(
                "max_queue_size must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backpressure_threshold) {
            return Err(crate::error::DispatchError::InvalidConfig(format!(
                "backpressure_threshold must be within [0.0, 1.0], got {}",
                self.backpressure_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.unhealthy_drop_rate) {
            return Err(crate::error::DispatchError::InvalidConfig(format!(
                "unhealthy_drop_rate must be within [0.0, 1.0], got {}",
                self.unhealthy_drop_rate
            )));
        }
        Ok(())
    }
}

/// Configuration for a [`ShardedDispatcher`](crate::ShardedDispatcher).
///
/// Each shard runs exactly one worker so per-symbol serialization is structural - the
/// `dispatcher.num_workers` field is ignored.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ShardedConfig {
    /// Number of independent shards. Typically 16-64.
    pub num_shards: usize,

    /// Per-shard dispatcher configuration (worker count forced to 1).
    pub dispatcher: DispatcherConfig,
}

impl Default for ShardedConfig {
    fn default() -> Self {
        Self {
            num_shards: 16,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ShardedConfig {
    pub fn validate(&self) -> Result<(), crate::error::DispatchError> {
        if self.num_shards == 0 {
            return Err(crate::error::DispatchError::InvalidConfig(
                "num_shards must be non-zero".to_string(),
            ));
        }
        self.dispatcher.validate()
    }
}
