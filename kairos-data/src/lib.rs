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

//! # Kairos-Data
//! A WebSocket integration layer for streaming public market data into the Kairos event core. It
//! is:
//! * **Normalised**: heterogeneous venue payloads are parsed into one [`MarketEvent`] schema, so
//!   downstream consumers never see venue-specific field tags.
//! * **Supervised**: every connection runs under a supervisor that restores the full
//!   subscription set after a reconnect, with a bounded attempt budget and linear backoff.
//! * **Fault-isolated**: malformed frames are counted and dropped, subscriber callback faults
//!   are caught and logged, and nothing unwinds past the read loop.
//!
//! ## User API
//! - [`MarketStreamClient`] to `connect` / `subscribe` / `unsubscribe` / `close` one venue
//!   connection.
//! - [`Channel`] describes a stream using the `<symbol>@<streamType>[_<interval>]` grammar.
//! - [`StreamEvent`] delivered to registered callbacks: normalized market data plus
//!   reconnection lifecycle notices.

/// [`MarketStreamClient`]: the per-venue connection supervisor.
pub mod client;

/// Connection and reconnection configuration.
pub mod config;

/// SerDe utilities for deserialising venue payloads (string-encoded numbers, epoch timestamps).
pub mod de;

/// All errors generated in `kairos-data`.
pub mod error;

/// Normalised [`MarketEvent`] and its [`MarketDataKind`] variants.
pub mod event;

/// Venue connectors translating [`Channel`]s into wire subscriptions and raw frames into
/// normalized events.
pub mod exchange;

/// Per-stream-type ingestion statistics ([`StreamMonitor`](monitor::StreamMonitor)).
pub mod monitor;

/// [`Channel`] grammar and the live [`SubscriptionSet`].
pub mod subscription;

pub use client::{ClientStats, ConnectionState, MarketStreamClient};
pub use config::ConnectionConfig;
pub use error::DataError;
pub use event::{MarketDataKind, MarketEvent, StreamEvent};
pub use subscription::{Channel, StreamType, SubscriptionSet};
