use crate::subscription::StreamType;
use chrono::{DateTime, Utc};
use derive_more::From;
use kairos_instrument::{Side, bar::Bar, instrument::Venue};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Normalised market event produced by a venue normalizer.
///
/// Every event is stamped with the `exchange` it originated from, the `data_type` of the stream,
/// the canonical UPPERCASE `symbol`, the venue event time (`time_exchange`) and the local
/// processing time (`time_received`).
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct MarketEvent {
    pub exchange: Venue,
    pub data_type: StreamType,
    pub symbol: SmolStr,
    pub time_exchange: DateTime<Utc>,
    pub time_received: DateTime<Utc>,
    pub kind: MarketDataKind,
}

impl MarketEvent {
    pub fn map_kind<F>(self, op: F) -> Self
    where
        F: FnOnce(MarketDataKind) -> MarketDataKind,
    {
        Self {
            kind: op(self.kind),
            ..self
        }
    }
}

/// Available kinds of normalised market data.
///
/// Normalizers are total functions from raw venue payloads into this sum type; handlers dispatch
/// on the tag.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, From)]
#[serde(rename_all = "snake_case")]
pub enum MarketDataKind {
    Kline(Kline),
    Depth(OrderBookDepth),
    Trade(PublicTrade),
    AggTrade(AggTrade),
    Ticker(Ticker),
    MiniTicker(MiniTicker),
    BookTicker(BookTicker),
}

/// Normalised OHLCV candle for one interval, open until `is_closed` is set.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Kline {
    pub interval: SmolStr,
    pub time_open: DateTime<Utc>,
    pub time_close: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub is_closed: bool,
}

impl Kline {
    /// Convert a closed [`Kline`] into the backtest [`Bar`] model.
    pub fn as_bar(&self) -> Bar {
        Bar {
            time: self.time_close,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// One price level of an order book side.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct Level {
    pub price: f64,
    pub amount: f64,
}

/// Normalised partial order book snapshot.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderBookDepth {
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Normalised public trade.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct PublicTrade {
    pub id: u64,
    pub price: f64,
    pub amount: f64,
    pub side: Side,
}

/// Normalised aggregate trade - one or more fills at one price, compacted by the venue.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct AggTrade {
    pub id: u64,
    pub first_trade_id: u64,
    pub last_trade_id: u64,
    pub price: f64,
    pub amount: f64,
    pub side: Side,
}

/// Normalised 24-hour rolling window ticker.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Ticker {
    pub price_change: f64,
    pub price_change_percent: f64,
    pub weighted_avg_price: f64,
    pub last_price: f64,
    pub last_quantity: f64,
    pub best_bid_price: f64,
    pub best_bid_quantity: f64,
    pub best_ask_price: f64,
    pub best_ask_quantity: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub time_open: DateTime<Utc>,
    pub time_close: DateTime<Utc>,
    pub trade_count: u64,
}

/// Condensed 24-hour rolling window ticker.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct MiniTicker {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

/// Best bid/ask update.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BookTicker {
    pub update_id: u64,
    pub best_bid_price: f64,
    pub best_bid_quantity: f64,
    pub best_ask_price: f64,
    pub best_ask_quantity: f64,
}

/// Event delivered to registered subscriber callbacks: market data plus connection lifecycle
/// notices the dispatcher should observe (an exhausted reconnect budget is critical).
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, From)]
pub enum StreamEvent {
    #[from]
    Market(MarketEvent),
    Reconnecting { venue: Venue, attempt: u32 },
    ReconnectExhausted { venue: Venue, attempts: u32 },
}
