use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalised OHLCV [`Bar`] for one instrument at one timestamp.
///
/// Immutable once emitted - the backtest engine consumes ordered `Vec<Bar>` sequences and the
/// ingestion layer produces closed candles that convert into this model.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
