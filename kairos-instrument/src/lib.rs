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

//! # Kairos-Instrument
//! Kairos-Instrument contains the core Venue, Instrument and Bar data structures shared by every
//! other Kairos crate, along with small associated utilities.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// OHLCV [`Bar`](bar::Bar) model - the atomic unit of price input.
pub mod bar;

/// [`Venue`](instrument::Venue) and [`InstrumentId`](instrument::InstrumentId) identifiers.
pub mod instrument;

/// [`Side`] of a trade or position - Buy or Sell.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}

pub mod test_utils {
    use crate::{
        bar::Bar,
        instrument::{InstrumentId, Venue},
    };
    use chrono::{DateTime, TimeDelta, Utc};

    pub fn instrument(symbol: &str) -> InstrumentId {
        InstrumentId::new(symbol, Venue::Binance)
    }

    pub fn time_plus_days(base: DateTime<Utc>, plus: u64) -> DateTime<Utc> {
        base + TimeDelta::days(plus as i64)
    }

    pub fn bar(time: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close * 1.001,
            low: close * 0.999,
            close,
            volume: 100.0,
        }
    }
}
