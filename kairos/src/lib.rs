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

//! # Kairos
//! Kairos is an event-driven trading substrate for backtesting and real-time market data. The
//! core is built from three cooperating subsystems:
//! * **Backtesting**: a deterministic multi-instrument portfolio simulator with a shared cash
//!   pool, strategy-driven signals, fee-aware fills, equity curves and performance statistics -
//!   see [`backtest::BacktestEngine`].
//! * **Dispatch**: a bounded, priority-aware, sharded event bus from
//!   [`kairos-dispatch`](kairos_dispatch) that serializes per-symbol event flow.
//! * **Ingestion**: supervised venue WebSocket connections from
//!   [`kairos-data`](kairos_data) feeding normalized events into the bus - composed by
//!   [`system::MarketSystem`].
//!
//! ## Examples
//! ```rust
//! use kairos::{
//!     backtest::{BacktestEngine, market_data::MarketDataSet},
//!     config::BacktestConfig,
//!     strategy::sma_cross::SmaCross,
//! };
//! use kairos_instrument::{instrument::{InstrumentId, Venue}, test_utils};
//! use chrono::{TimeDelta, Utc};
//!
//! let instrument = InstrumentId::new("BTCUSDT", Venue::Simulated);
//! let start = Utc::now();
//! let bars: Vec<_> = (0..64)
//!     .map(|i| {
//!         let price = 100.0 + (i as f64 * 0.7).sin() * 5.0;
//!         test_utils::bar(start + TimeDelta::hours(i), price)
//!     })
//!     .collect();
//!
//! let mut market_data = MarketDataSet::new();
//! market_data.insert(instrument, bars).unwrap();
//!
//! let engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
//! let result = engine.run(&market_data, || SmaCross::new(5, 20)).unwrap();
//! assert_eq!(result.equity_curve.len(), 64);
//! ```

/// Portfolio backtest engine: time alignment, fills, forced-exit sweep, result summary.
pub mod backtest;

/// Backtest configuration.
pub mod config;

/// All errors generated in `kairos`.
pub mod error;

/// Tracing initialisation helpers.
pub mod logging;

/// [`Position`](portfolio::Position) and [`PortfolioState`](portfolio::PortfolioState).
pub mod portfolio;

/// Performance statistics derived from equity curves and trades.
pub mod statistic;

/// [`Strategy`](strategy::Strategy) capability interface, decisions and the signal pre-pass.
pub mod strategy;

/// Live composition: venue ingestion feeding the sharded dispatcher.
pub mod system;

pub use config::BacktestConfig;
pub use error::EngineError;
