#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Kairos-Dispatch
//! A bounded, priority-aware event dispatch core for market data and trading signals. It is:
//! * **Prioritised**: events are dequeued in `(priority, sequence)` order, so `Critical` work
//!   always runs before `Background` work, and equal-priority events keep FIFO order.
//! * **Back-pressured**: every queue is strictly bounded. Under load, lower-priority events are
//!   probabilistically shed rather than letting the queue grow without bound - `Critical` events
//!   are never shed.
//! * **Sharded**: the [`ShardedDispatcher`] routes symbol-bearing events to
//!   `fnv(symbol) % num_shards`, giving strict per-symbol ordering while different symbols are
//!   processed concurrently.
//!
//! ## User API
//! - [`EventDispatcher`] for a single queue + worker pool + per-event-type handler fan-out.
//! - [`ShardedDispatcher`] when per-symbol serial order matters (it usually does).
//! - [`DispatcherStats`] snapshots via `stats()` for observability.
//!
//! ## Examples
//! ```rust
//! use kairos_dispatch::{DispatcherConfig, EventDispatcher, EventPriority, PutOptions};
//! use std::sync::{Arc, Mutex};
//!
//! let dispatcher = EventDispatcher::<String>::new(DispatcherConfig {
//!     num_workers: 1,
//!     ..DispatcherConfig::default()
//! });
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_handler = Arc::clone(&seen);
//! dispatcher.register("tick", move |event| {
//!     seen_handler.lock().unwrap().push(event.payload.clone());
//! });
//!
//! dispatcher.start().unwrap();
//! assert!(dispatcher.put("tick", String::from("BTCUSDT@42000")));
//! assert!(dispatcher.put_with(
//!     "tick",
//!     String::from("halt"),
//!     PutOptions::default().with_priority(EventPriority::Critical),
//! ));
//! dispatcher.stop();
//! ```

/// Dispatcher and sharded dispatcher configuration.
pub mod config;

/// [`EventDispatcher`]: single bounded queue, worker pool and handler registry.
pub mod dispatcher;

/// All errors generated in `kairos-dispatch`.
pub mod error;

/// [`PrioritizedEvent`] and [`EventPriority`] - the records flowing through every queue.
pub mod event;

/// [`EventMetrics`] counters and [`DispatcherStats`] snapshots.
pub mod metrics;

/// [`BoundedPriorityQueue`]: fixed-capacity `(priority, sequence)` min-heap with blocking
/// and non-blocking put/get.
pub mod queue;

/// [`ShardedDispatcher`]: N single-worker dispatchers keyed by symbol hash.
pub mod sharded;

pub use config::{DispatcherConfig, ShardedConfig};
pub use dispatcher::{EventDispatcher, HandlerId, PutOptions};
pub use error::DispatchError;
pub use event::{EventPriority, PrioritizedEvent};
pub use metrics::{DispatcherStats, EventMetrics};
pub use queue::BoundedPriorityQueue;
pub use sharded::ShardedDispatcher;
