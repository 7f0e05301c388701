use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `kairos-dispatch`.
///
/// The hot paths (enqueue, worker loop) are deliberately error-free - refusals are communicated
/// via `bool`/`Option` sentinels and counted in the metrics. Only configuration validation at
/// `start()` can reject a dispatcher outright.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum DispatchError {
    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    #[error("shard index {index} out of bounds for {num_shards} shards")]
    ShardOutOfBounds { index: usize, num_shards: usize },

    #[error("failed to spawn dispatcher worker thread: {0}")]
    WorkerSpawn(String),
}
