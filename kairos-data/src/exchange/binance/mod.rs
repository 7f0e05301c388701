use self::message::{
    BinanceAggTradeEvent, BinanceBookTickerEvent, BinanceDepth, BinanceKlineEvent,
    BinanceMiniTickerEvent, BinanceTickerEvent, BinanceTradeEvent,
};
use crate::{
    error::DataError,
    event::{MarketDataKind, MarketEvent},
    exchange::VenueConnector,
    subscription::{Channel, StreamType},
};
use chrono::{DateTime, Utc};
use kairos_instrument::instrument::Venue;
use serde::Deserialize;
use serde_json::Value;
use smol_str::SmolStr;
use std::str::FromStr;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;
use url::Url;

/// Raw Binance payload models and their conversions into the normalized schema.
pub mod message;

/// Binance combined-stream WebSocket base URL.
///
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#websocket-market-streams>
pub const BASE_URL_BINANCE: &str = "wss://stream.binance.com:9443/stream";

/// Binance [`VenueConnector`].
///
/// Handles both payload envelopes Binance emits:
/// * combined-stream frames: `{"stream": "btcusdt@trade", "data": {...}}`
/// * direct event frames: `{"e": "trade", ...}`
///
/// Subscription management frames (`{"result": null, "id": 1}`) parse to `Ok(None)`.
#[derive(Clone, Debug, Default)]
pub struct Binance {
    url: Option<Url>,
}

impl Binance {
    /// Connector for the production combined-stream endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector for a custom endpoint (eg/ a testnet or a local fixture server).
    pub fn with_url(url: Url) -> Self {
        Self { url: Some(url) }
    }
}

fn normalize(
    stream: StreamType,
    symbol_hint: Option<SmolStr>,
    data: &Value,
) -> Result<Option<MarketEvent>, DataError> {
    let deserialise = |error: serde_json::Error| DataError::Deserialise {
        error,
        payload: data.to_string(),
    };

    let (symbol, time_exchange, kind) = match stream {
        StreamType::Kline => {
            let event = BinanceKlineEvent::deserialize(data).map_err(deserialise)?;
            (
                event.symbol.clone(),
                event.time,
                MarketDataKind::Kline(event.kline.into()),
            )
        }
        StreamType::Depth => {
            let depth = BinanceDepth::deserialize(data).map_err(deserialise)?;
            // Partial depth snapshots carry no symbol or event time of their own
            let symbol = symbol_hint.ok_or_else(|| DataError::InvalidChannel {
                channel: "depth".to_string(),
                reason: "depth frames are only identifiable via a combined stream".to_string(),
            })?;
            (symbol, Utc::now(), MarketDataKind::Depth(depth.into()))
        }
        StreamType::Trade => {
            let event = BinanceTradeEvent::deserialize(data).map_err(deserialise)?;
            (
                event.symbol.clone(),
                event.time,
                MarketDataKind::Trade(event.into()),
            )
        }
        StreamType::AggTrade => {
            let event = BinanceAggTradeEvent::deserialize(data).map_err(deserialise)?;
            (
                event.symbol.clone(),
                event.time,
                MarketDataKind::AggTrade(event.into()),
            )
        }
        StreamType::Ticker => {
            let event = BinanceTickerEvent::deserialize(data).map_err(deserialise)?;
            (
                event.symbol.clone(),
                event.time,
                MarketDataKind::Ticker(event.into()),
            )
        }
        StreamType::MiniTicker => {
            let event = BinanceMiniTickerEvent::deserialize(data).map_err(deserialise)?;
            (
                event.symbol.clone(),
                event.time,
                MarketDataKind::MiniTicker(event.into()),
            )
        }
        StreamType::BookTicker => {
            let event = BinanceBookTickerEvent::deserialize(data).map_err(deserialise)?;
            let symbol = event.symbol.clone();
            (symbol, Utc::now(), MarketDataKind::BookTicker(event.into()))
        }
    };

    Ok(Some(stamp(stream, symbol, time_exchange, kind)))
}

fn stamp(
    data_type: StreamType,
    symbol: SmolStr,
    time_exchange: DateTime<Utc>,
    kind: MarketDataKind,
) -> MarketEvent {
    MarketEvent {
        exchange: Venue::Binance,
        data_type,
        symbol: SmolStr::new(symbol.to_uppercase()),
        time_exchange,
        time_received: Utc::now(),
        kind,
    }
}

impl VenueConnector for Binance {
    const VENUE: Venue = Venue::Binance;

    fn url(&self) -> Result<Url, DataError> {
        match &self.url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(BASE_URL_BINANCE).map_err(DataError::UrlParse),
        }
    }

    fn subscribe_payload(&self, channels: &[Channel]) -> WsMessage {
        subscription_request("SUBSCRIBE", channels, 1)
    }

    fn unsubscribe_payload(&self, channels: &[Channel]) -> WsMessage {
        subscription_request("UNSUBSCRIBE", channels, 2)
    }

    fn parse_frame(&self, frame: &str) -> Result<Option<MarketEvent>, DataError> {
        let message =
            serde_json::from_str::<Value>(frame).map_err(|error| DataError::Deserialise {
                error,
                payload: frame.to_string(),
            })?;

        // Combined stream envelope: {"stream": "<symbol>@<type>", "data": {...}}
        if let (Some(stream), Some(data)) = (
            message.get("stream").and_then(Value::as_str),
            message.get("data"),
        ) {
            let channel = Channel::from_str(stream)?;
            return normalize(channel.stream, Some(channel.canonical_symbol()), data);
        }

        // Subscription management acknowledgement: {"result": null, "id": 1}
        if message.get("id").is_some() {
            debug!(payload = %message, "received subscription management response");
            return Ok(None);
        }

        // Direct event frame: {"e": "<eventType>", ...}
        if let Some(event_type) = message.get("e").and_then(Value::as_str) {
            let stream = match event_type {
                "kline" => StreamType::Kline,
                "trade" => StreamType::Trade,
                "aggTrade" => StreamType::AggTrade,
                "24hrTicker" => StreamType::Ticker,
                "24hrMiniTicker" => StreamType::MiniTicker,
                other => return Err(DataError::UnsupportedStream(other.to_string())),
            };
            return normalize(stream, None, &message);
        }

        Err(DataError::UnsupportedStream(format!(
            "unrecognised frame shape: {frame}"
        )))
    }
}

fn subscription_request(method: &str, channels: &[Channel], id: u64) -> WsMessage {
    let params: Vec<String> = channels.iter().map(Channel::to_string).collect();

    WsMessage::text(
        serde_json::json!({
            "method": method,
            "params": params,
            "id": id,
        })
        .to_string(),
    )
}
