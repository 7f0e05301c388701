use crate::{
    config::{DispatcherConfig, ShardedConfig},
    dispatcher::{EventDispatcher, EventHandler, HandlerId, PutOptions},
    error::DispatchError,
    event::PrioritizedEvent,
    metrics::DispatcherStats,
};
use fnv::FnvHasher;
use smol_str::SmolStr;
use std::{
    fmt,
    hash::Hasher,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use tracing::info;

/// N independent single-worker [`EventDispatcher`]s with stable symbol routing.
///
/// Routing: `shard = fnv(symbol) % num_shards` for symbol-bearing events; events without a
/// symbol are distributed round-robin. Because each shard runs exactly one worker, all events
/// for one symbol are strictly serialized in `(priority, sequence)` order, while events for
/// different symbols execute concurrently across shards.
///
/// A single queue would serialize the entire stream; sharding preserves the property that
/// matters (no out-of-order ticks within a symbol) while exploiting parallelism across symbols.
pub struct ShardedDispatcher<T> {
    shards: Vec<EventDispatcher<T>>,
    round_robin: AtomicUsize,
    next_handler_id: AtomicU64,
}

impl<T> fmt::Debug for ShardedDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedDispatcher")
            .field("num_shards", &self.shards.len())
            .finish()
    }
}

impl<T> ShardedDispatcher<T>
where
    T: Send + 'static,
{
    pub fn new(config: ShardedConfig) -> Self {
        let shard_config = DispatcherConfig {
            // One worker per shard is what makes per-symbol serialization structural
            num_workers: 1,
            ..config.dispatcher
        };

        let shards = (0..config.num_shards.max(1))
            .map(|_| EventDispatcher::new(shard_config.clone()))
            .collect();

        Self {
            shards,
            round_robin: AtomicUsize::new(0),
            next_handler_id: AtomicU64::new(0),
        }
    }

    /// Register a handler for the provided event type on every shard.
    pub fn register<Type, F>(&self, event_type: Type, handler: F) -> HandlerId
    where
        Type: Into<SmolStr>,
        F: Fn(&PrioritizedEvent<T>) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        let handler: EventHandler<T> = Arc::new(handler);

        for shard in &self.shards {
            shard.register_entry(event_type.clone(), id, Arc::clone(&handler));
        }
        id
    }

    /// Unregister a handler from every shard. Returns true if any shard held it.
    pub fn unregister(&self, event_type: &str, id: HandlerId) -> bool {
        self.shards
            .iter()
            .fold(false, |removed, shard| shard.unregister(event_type, id) || removed)
    }

    pub fn start(&self) -> Result<(), DispatchError> {
        for shard in &self.shards {
            shard.start()?;
        }
        info!(num_shards = self.shards.len(), "sharded dispatcher started");
        Ok(())
    }

    pub fn stop(&self) {
        for shard in &self.shards {
            shard.stop();
        }
        info!(num_shards = self.shards.len(), "sharded dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shards.iter().any(EventDispatcher::is_running)
    }

    /// Enqueue an event, routing by `options.symbol` when present, round-robin otherwise.
    pub fn put_with<Type>(&self, event_type: Type, payload: T, options: PutOptions) -> bool
    where
        Type: Into<SmolStr>,
    {
        let shard = match options.symbol.as_deref() {
            Some(symbol) => self.shard_for(symbol),
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % self.shards.len(),
        };
        self.shards[shard].put_with(event_type, payload, options)
    }

    /// Enqueue a symbol-keyed event with otherwise default [`PutOptions`].
    pub fn put<Type, S>(&self, event_type: Type, symbol: S, payload: T) -> bool
    where
        Type: Into<SmolStr>,
        S: Into<SmolStr>,
    {
        self.put_with(
            event_type,
            payload,
            PutOptions::default().with_symbol(symbol),
        )
    }

    /// Stable shard index for a symbol.
    pub fn shard_for(&self, symbol: &str) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write(symbol.as_bytes());
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Unhealthy if any shard reports unhealthy.
    pub fn is_healthy(&self) -> bool {
        self.shards.iter().all(EventDispatcher::is_healthy)
    }

    /// Aggregate statistics across all shards.
    pub fn stats(&self) -> DispatcherStats {
        self.shards
            .iter()
            .map(EventDispatcher::stats)
            .fold(DispatcherStats::default(), DispatcherStats::merge)
    }

    /// Statistics for one shard.
    pub fn shard_stats(&self, index: usize) -> Result<DispatcherStats, DispatchError> {
        self.shards
            .get(index)
            .map(EventDispatcher::stats)
            .ok_or(DispatchError::ShardOutOfBounds {
                index,
                num_shards: self.shards.len(),
            })
    }
}
