use crate::{
    de::{de_str, de_u64_epoch_ms_as_datetime_utc, se_datetime_utc_as_u64_epoch_ms},
    event::{
        AggTrade, BookTicker, Kline, Level, MarketDataKind, MiniTicker, OrderBookDepth,
        PublicTrade, Ticker,
    },
};
use chrono::{DateTime, Utc};
use kairos_instrument::Side;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Binance kline/candlestick event.
///
/// ### Raw Payload Examples
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#kline-candlestick-streams>
/// ```json
/// {
///     "e": "kline",
///     "E": 1672515782136,
///     "s": "BTCUSDT",
///     "k": {
///         "t": 1672515720000, "T": 1672515779999,
///         "s": "BTCUSDT", "i": "1m",
///         "f": 100, "L": 200,
///         "o": "0.0010", "c": "0.0020", "h": "0.0025", "l": "0.0015",
///         "v": "1000", "n": 100, "x": false, "q": "1.0000",
///         "V": "500", "Q": "0.500", "B": "123456"
///     }
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceKlineEvent {
    #[serde(
        alias = "E",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time: DateTime<Utc>,
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(alias = "k")]
    pub kline: BinanceKlineData,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceKlineData {
    #[serde(
        alias = "t",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time_open: DateTime<Utc>,
    #[serde(
        alias = "T",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time_close: DateTime<Utc>,
    #[serde(alias = "i")]
    pub interval: SmolStr,
    #[serde(alias = "o", deserialize_with = "de_str")]
    pub open: f64,
    #[serde(alias = "h", deserialize_with = "de_str")]
    pub high: f64,
    #[serde(alias = "l", deserialize_with = "de_str")]
    pub low: f64,
    #[serde(alias = "c", deserialize_with = "de_str")]
    pub close: f64,
    #[serde(alias = "v", deserialize_with = "de_str")]
    pub volume: f64,
    #[serde(alias = "q", deserialize_with = "de_str")]
    pub quote_volume: f64,
    #[serde(alias = "n")]
    pub trade_count: u64,
    #[serde(alias = "x")]
    pub is_closed: bool,
}

impl From<BinanceKlineData> for Kline {
    fn from(kline: BinanceKlineData) -> Self {
        Self {
            interval: kline.interval,
            time_open: kline.time_open,
            time_close: kline.time_close,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
            quote_volume: kline.quote_volume,
            trade_count: kline.trade_count,
            is_closed: kline.is_closed,
        }
    }
}

/// Binance partial book depth snapshot, emitted on combined streams without an event envelope.
///
/// ### Raw Payload Examples
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#partial-book-depth-streams>
/// ```json
/// {
///     "lastUpdateId": 160,
///     "bids": [["0.0024", "10"]],
///     "asks": [["0.0026", "100"]]
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceDepth {
    #[serde(alias = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<BinanceLevel>,
    pub asks: Vec<BinanceLevel>,
}

/// Binance `["<price>", "<amount>"]` order book level.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BinanceLevel(
    #[serde(deserialize_with = "de_str")] pub f64,
    #[serde(deserialize_with = "de_str")] pub f64,
);

impl From<BinanceLevel> for Level {
    fn from(BinanceLevel(price, amount): BinanceLevel) -> Self {
        Self { price, amount }
    }
}

impl From<BinanceDepth> for OrderBookDepth {
    fn from(depth: BinanceDepth) -> Self {
        Self {
            last_update_id: depth.last_update_id,
            bids: depth.bids.into_iter().map(Level::from).collect(),
            asks: depth.asks.into_iter().map(Level::from).collect(),
        }
    }
}

/// Binance real-time trade message.
///
/// ### Raw Payload Examples
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#trade-streams>
/// ```json
/// {
///     "e": "trade", "E": 1649324825173, "s": "ETHUSDT", "t": 1000000000,
///     "p": "10000.19", "q": "0.239000", "T": 1649324825170, "m": false, "M": true
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceTradeEvent {
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(alias = "t")]
    pub id: u64,
    #[serde(alias = "p", deserialize_with = "de_str")]
    pub price: f64,
    #[serde(alias = "q", deserialize_with = "de_str")]
    pub amount: f64,
    #[serde(
        alias = "T",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time: DateTime<Utc>,
    #[serde(alias = "m", deserialize_with = "de_side_from_buyer_is_maker")]
    pub side: Side,
}

impl From<BinanceTradeEvent> for PublicTrade {
    fn from(trade: BinanceTradeEvent) -> Self {
        Self {
            id: trade.id,
            price: trade.price,
            amount: trade.amount,
            side: trade.side,
        }
    }
}

/// Binance aggregate trade message.
///
/// ### Raw Payload Examples
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#aggregate-trade-streams>
/// ```json
/// {
///     "e": "aggTrade", "E": 1672515782136, "s": "BNBBTC", "a": 12345,
///     "p": "0.001", "q": "100", "f": 100, "l": 105,
///     "T": 1672515782136, "m": true, "M": true
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceAggTradeEvent {
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(alias = "a")]
    pub id: u64,
    #[serde(alias = "f")]
    pub first_trade_id: u64,
    #[serde(alias = "l")]
    pub last_trade_id: u64,
    #[serde(alias = "p", deserialize_with = "de_str")]
    pub price: f64,
    #[serde(alias = "q", deserialize_with = "de_str")]
    pub amount: f64,
    #[serde(
        alias = "T",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time: DateTime<Utc>,
    #[serde(alias = "m", deserialize_with = "de_side_from_buyer_is_maker")]
    pub side: Side,
}

impl From<BinanceAggTradeEvent> for AggTrade {
    fn from(trade: BinanceAggTradeEvent) -> Self {
        Self {
            id: trade.id,
            first_trade_id: trade.first_trade_id,
            last_trade_id: trade.last_trade_id,
            price: trade.price,
            amount: trade.amount,
            side: trade.side,
        }
    }
}

/// Binance 24-hour rolling window ticker.
///
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#individual-symbol-ticker-streams>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceTickerEvent {
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(
        alias = "E",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time: DateTime<Utc>,
    #[serde(alias = "p", deserialize_with = "de_str")]
    pub price_change: f64,
    #[serde(alias = "P", deserialize_with = "de_str")]
    pub price_change_percent: f64,
    #[serde(alias = "w", deserialize_with = "de_str")]
    pub weighted_avg_price: f64,
    #[serde(alias = "c", deserialize_with = "de_str")]
    pub last_price: f64,
    #[serde(alias = "Q", deserialize_with = "de_str")]
    pub last_quantity: f64,
    #[serde(alias = "b", deserialize_with = "de_str")]
    pub best_bid_price: f64,
    #[serde(alias = "B", deserialize_with = "de_str")]
    pub best_bid_quantity: f64,
    #[serde(alias = "a", deserialize_with = "de_str")]
    pub best_ask_price: f64,
    #[serde(alias = "A", deserialize_with = "de_str")]
    pub best_ask_quantity: f64,
    #[serde(alias = "o", deserialize_with = "de_str")]
    pub open: f64,
    #[serde(alias = "h", deserialize_with = "de_str")]
    pub high: f64,
    #[serde(alias = "l", deserialize_with = "de_str")]
    pub low: f64,
    #[serde(alias = "v", deserialize_with = "de_str")]
    pub volume: f64,
    #[serde(alias = "q", deserialize_with = "de_str")]
    pub quote_volume: f64,
    #[serde(
        alias = "O",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time_open: DateTime<Utc>,
    #[serde(
        alias = "C",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time_close: DateTime<Utc>,
    #[serde(alias = "n")]
    pub trade_count: u64,
}

impl From<BinanceTickerEvent> for Ticker {
    fn from(ticker: BinanceTickerEvent) -> Self {
        Self {
            price_change: ticker.price_change,
            price_change_percent: ticker.price_change_percent,
            weighted_avg_price: ticker.weighted_avg_price,
            last_price: ticker.last_price,
            last_quantity: ticker.last_quantity,
            best_bid_price: ticker.best_bid_price,
            best_bid_quantity: ticker.best_bid_quantity,
            best_ask_price: ticker.best_ask_price,
            best_ask_quantity: ticker.best_ask_quantity,
            open: ticker.open,
            high: ticker.high,
            low: ticker.low,
            volume: ticker.volume,
            quote_volume: ticker.quote_volume,
            time_open: ticker.time_open,
            time_close: ticker.time_close,
            trade_count: ticker.trade_count,
        }
    }
}

/// Binance condensed 24-hour rolling window ticker.
///
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#individual-symbol-mini-ticker-stream>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceMiniTickerEvent {
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(
        alias = "E",
        deserialize_with = "de_u64_epoch_ms_as_datetime_utc",
        serialize_with = "se_datetime_utc_as_u64_epoch_ms"
    )]
    pub time: DateTime<Utc>,
    #[serde(alias = "o", deserialize_with = "de_str")]
    pub open: f64,
    #[serde(alias = "h", deserialize_with = "de_str")]
    pub high: f64,
    #[serde(alias = "l", deserialize_with = "de_str")]
    pub low: f64,
    #[serde(alias = "c", deserialize_with = "de_str")]
    pub close: f64,
    #[serde(alias = "v", deserialize_with = "de_str")]
    pub volume: f64,
    #[serde(alias = "q", deserialize_with = "de_str")]
    pub quote_volume: f64,
}

impl From<BinanceMiniTickerEvent> for MiniTicker {
    fn from(ticker: BinanceMiniTickerEvent) -> Self {
        Self {
            open: ticker.open,
            high: ticker.high,
            low: ticker.low,
            close: ticker.close,
            volume: ticker.volume,
            quote_volume: ticker.quote_volume,
        }
    }
}

/// Binance best bid/ask update, emitted on combined streams without an event envelope.
///
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#individual-symbol-book-ticker-streams>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceBookTickerEvent {
    #[serde(alias = "u")]
    pub update_id: u64,
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(alias = "b", deserialize_with = "de_str")]
    pub best_bid_price: f64,
    #[serde(alias = "B", deserialize_with = "de_str")]
    pub best_bid_quantity: f64,
    #[serde(alias = "a", deserialize_with = "de_str")]
    pub best_ask_price: f64,
    #[serde(alias = "A", deserialize_with = "de_str")]
    pub best_ask_quantity: f64,
}

impl From<BinanceBookTickerEvent> for BookTicker {
    fn from(ticker: BinanceBookTickerEvent) -> Self {
        Self {
            update_id: ticker.update_id,
            best_bid_price: ticker.best_bid_price,
            best_bid_quantity: ticker.best_bid_quantity,
            best_ask_price: ticker.best_ask_price,
            best_ask_quantity: ticker.best_ask_quantity,
        }
    }
}

impl From<BinanceKlineEvent> for MarketDataKind {
    fn from(event: BinanceKlineEvent) -> Self {
        MarketDataKind::Kline(event.kline.into())
    }
}

/// Deserialize a Binance "buyer_is_maker" boolean field to a [`Side`].
///
/// Variants:
/// buyer_is_maker => Side::Sell
/// !buyer_is_maker => Side::Buy
pub fn de_side_from_buyer_is_maker<'de, D>(deserializer: D) -> Result<Side, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    serde::de::Deserialize::deserialize(deserializer).map(|buyer_is_maker| {
        if buyer_is_maker {
            Side::Sell
        } else {
            Side::Buy
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod de {
        use super::*;
        use crate::de::datetime_utc_from_epoch_duration;
        use std::time::Duration;

        #[test]
        fn test_binance_trade_event() {
            struct TestCase {
                input: &'static str,
                expected: Result<BinanceTradeEvent, ()>,
            }

            let tests = vec![
                TestCase {
                    // TC0: valid Spot trade, buyer is taker
                    input: r#"
                    {
                        "e":"trade","E":1649324825173,"s":"ETHUSDT","t":1000000000,
                        "p":"10000.19","q":"0.239000","b":10108767791,"a":10108764858,
                        "T":1649324825170,"m":false,"M":true
                    }
                    "#,
                    expected: Ok(BinanceTradeEvent {
                        symbol: SmolStr::new_static("ETHUSDT"),
                        id: 1000000000,
                        price: 10000.19,
                        amount: 0.239,
                        time: datetime_utc_from_epoch_duration(Duration::from_millis(
                            1649324825170,
                        )),
                        side: Side::Buy,
                    }),
                },
                TestCase {
                    // TC1: valid trade, buyer is maker
                    input: r#"
                    {
                        "e":"trade","E":1649324825173,"s":"BTCUSDT","t":7,
                        "p":"42000.5","q":"1.0","T":1649324825170,"m":true
                    }
                    "#,
                    expected: Ok(BinanceTradeEvent {
                        symbol: SmolStr::new_static("BTCUSDT"),
                        id: 7,
                        price: 42000.5,
                        amount: 1.0,
                        time: datetime_utc_from_epoch_duration(Duration::from_millis(
                            1649324825170,
                        )),
                        side: Side::Sell,
                    }),
                },
                TestCase {
                    // TC2: malformed boolean "m" field
                    input: r#"{"e":"trade","E":1,"s":"BTCUSDT","t":7,"p":"1","q":"1","T":1,"m":"yes"}"#,
                    expected: Err(()),
                },
            ];

            for (index, test) in tests.into_iter().enumerate() {
                let actual = serde_json::from_str::<BinanceTradeEvent>(test.input);
                match (actual, test.expected) {
                    (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "TC{index} failed"),
                    (Err(_), Err(_)) => {}
                    (actual, expected) => {
                        panic!("TC{index} failed. \nActual: {actual:?}\nExpected: {expected:?}")
                    }
                }
            }
        }

        #[test]
        fn test_binance_kline_event() {
            let input = r#"
            {
                "e": "kline",
                "E": 1672515782136,
                "s": "BTCUSDT",
                "k": {
                    "t": 1672515720000, "T": 1672515779999,
                    "s": "BTCUSDT", "i": "1m",
                    "f": 100, "L": 200,
                    "o": "16700.00", "c": "16705.50", "h": "16712.50", "l": "16698.00",
                    "v": "32.5", "n": 812, "x": true, "q": "543000.0",
                    "V": "16.0", "Q": "271000.0", "B": "0"
                }
            }
            "#;

            let actual = serde_json::from_str::<BinanceKlineEvent>(input).unwrap();
            assert_eq!(actual.symbol.as_str(), "BTCUSDT");
            assert_eq!(actual.kline.interval.as_str(), "1m");
            assert_eq!(actual.kline.open, 16700.0);
            assert_eq!(actual.kline.close, 16705.5);
            assert_eq!(actual.kline.trade_count, 812);
            assert!(actual.kline.is_closed);
        }

        #[test]
        fn test_binance_depth() {
            let input = r#"
            {
                "lastUpdateId": 160,
                "bids": [["0.0024", "10"], ["0.0022", "5"]],
                "asks": [["0.0026", "100"]]
            }
            "#;

            let actual = serde_json::from_str::<BinanceDepth>(input).unwrap();
            let normalized = OrderBookDepth::from(actual);

            assert_eq!(normalized.last_update_id, 160);
            assert_eq!(normalized.bids.len(), 2);
            assert_eq!(
                normalized.bids[0],
                Level {
                    price: 0.0024,
                    amount: 10.0
                }
            );
            assert_eq!(
                normalized.asks[0],
                Level {
                    price: 0.0026,
                    amount: 100.0
                }
            );
        }

        #[test]
        fn test_binance_agg_trade_event() {
            let input = r#"
            {
                "e": "aggTrade", "E": 1672515782136, "s": "BNBBTC", "a": 12345,
                "p": "0.001", "q": "100", "f": 100, "l": 105,
                "T": 1672515782136, "m": true, "M": true
            }
            "#;

            let actual = serde_json::from_str::<BinanceAggTradeEvent>(input).unwrap();
            assert_eq!(actual.id, 12345);
            assert_eq!(actual.first_trade_id, 100);
            assert_eq!(actual.last_trade_id, 105);
            assert_eq!(actual.side, Side::Sell);
        }

        #[test]
        fn test_binance_book_ticker_event() {
            let input = r#"
            {
                "u": 400900217, "s": "BNBUSDT",
                "b": "25.35190000", "B": "31.21000000",
                "a": "25.36520000", "A": "40.66000000"
            }
            "#;

            let actual = serde_json::from_str::<BinanceBookTickerEvent>(input).unwrap();
            assert_eq!(actual.update_id, 400900217);
            assert_eq!(actual.best_bid_price, 25.3519);
            assert_eq!(actual.best_ask_quantity, 40.66);
        }

        #[test]
        fn test_binance_mini_ticker_event() {
            let input = r#"
            {
                "e": "24hrMiniTicker", "E": 1672515782136, "s": "BNBBTC",
                "c": "0.0025", "o": "0.0010", "h": "0.0025", "l": "0.0010",
                "v": "10000", "q": "18"
            }
            "#;

            let actual = serde_json::from_str::<BinanceMiniTickerEvent>(input).unwrap();
            assert_eq!(actual.close, 0.0025);
            assert_eq!(actual.quote_volume, 18.0);
        }
    }
}
