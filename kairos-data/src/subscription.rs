use crate::error::DataError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// Kind of market data stream a [`Channel`] subscribes to.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamType {
    Kline,
    Depth,
    Trade,
    AggTrade,
    Ticker,
    MiniTicker,
    BookTicker,
}

impl StreamType {
    /// Stream type name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Kline => "kline",
            StreamType::Depth => "depth",
            StreamType::Trade => "trade",
            StreamType::AggTrade => "aggTrade",
            StreamType::Ticker => "ticker",
            StreamType::MiniTicker => "miniTicker",
            StreamType::BookTicker => "bookTicker",
        }
    }

    /// Whether the stream grammar requires an `_<interval>` suffix.
    pub fn requires_interval(&self) -> bool {
        matches!(self, StreamType::Kline)
    }
}

impl FromStr for StreamType {
    type Err = DataError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "kline" => Ok(StreamType::Kline),
            "depth" => Ok(StreamType::Depth),
            "trade" => Ok(StreamType::Trade),
            "aggTrade" => Ok(StreamType::AggTrade),
            "ticker" => Ok(StreamType::Ticker),
            "miniTicker" => Ok(StreamType::MiniTicker),
            "bookTicker" => Ok(StreamType::BookTicker),
            other => Err(DataError::UnsupportedStream(other.to_string())),
        }
    }
}

impl Display for StreamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A market data channel using the `<symbol>@<streamType>[_<interval>]` grammar.
///
/// The wire representation uses a lowercase symbol (venues require it when subscribing);
/// normalized events always carry the canonical UPPERCASE symbol.
///
/// eg/ "btcusdt@kline_1m", "ethusdt@depth", "btcusdt@trade"
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct Channel {
    pub symbol: SmolStr,
    pub stream: StreamType,
    pub interval: Option<SmolStr>,
}

impl Channel {
    pub fn new<S>(symbol: S, stream: StreamType) -> Self
    where
        S: AsRef<str>,
    {
        Self {
            symbol: SmolStr::new(symbol.as_ref().to_lowercase()),
            stream,
            interval: None,
        }
    }

    pub fn with_interval<S>(self, interval: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self {
            interval: Some(interval.into()),
            ..self
        }
    }

    /// Canonical UPPERCASE symbol for normalized events.
    pub fn canonical_symbol(&self) -> SmolStr {
        SmolStr::new(self.symbol.to_uppercase())
    }
}

impl FromStr for Channel {
    type Err = DataError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DataError::InvalidChannel {
            channel: input.to_string(),
            reason: reason.to_string(),
        };

        let (symbol, stream_part) = input
            .split_once('@')
            .ok_or_else(|| invalid("missing '@' separator"))?;
        if symbol.is_empty() {
            return Err(invalid("empty symbol"));
        }

        let (stream_name, interval) = match stream_part.split_once('_') {
            Some((name, interval)) if !interval.is_empty() => (name, Some(interval)),
            Some((_, _)) => return Err(invalid("empty interval suffix")),
            None => (stream_part, None),
        };

        let stream = StreamType::from_str(stream_name)?;
        if stream.requires_interval() && interval.is_none() {
            return Err(invalid("kline streams require an '_<interval>' suffix"));
        }

        Ok(Self {
            symbol: SmolStr::new(symbol.to_lowercase()),
            stream,
            interval: interval.map(SmolStr::new),
        })
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.stream)?;
        if let Some(interval) = &self.interval {
            write!(f, "_{interval}")?;
        }
        Ok(())
    }
}

/// The live set of subscribed [`Channel`]s, keyed by canonical channel string.
///
/// Mutated by subscribe/unsubscribe and replayed in insertion order after a reconnect.
/// Subscribing to an already-live channel is a no-op, so `subscribe(c); subscribe(c)` yields one
/// live subscription.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    channels: Mutex<IndexMap<SmolStr, Channel>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add channels, returning only those that were not already live.
    pub fn add(&self, channels: &[Channel]) -> Vec<Channel> {
        let mut live = self.channels.lock();
        channels
            .iter()
            .filter(|channel| {
                live.insert(SmolStr::new(channel.to_string()), (*channel).clone())
                    .is_none()
            })
            .cloned()
            .collect()
    }

    /// Remove channels, returning only those that were actually live.
    pub fn remove(&self, channels: &[Channel]) -> Vec<Channel> {
        let mut live = self.channels.lock();
        channels
            .iter()
            .filter(|channel| {
                live.shift_remove(channel.to_string().as_str())
                    .is_some()
            })
            .cloned()
            .collect()
    }

    /// Snapshot of all live channels in insertion order.
    pub fn snapshot(&self) -> Vec<Channel> {
        self.channels.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    pub fn contains(&self, channel: &Channel) -> bool {
        self.channels
            .lock()
            .contains_key(channel.to_string().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        struct TestCase {
            input: &'static str,
            expected: Result<Channel, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: kline with interval
                input: "btcusdt@kline_1m",
                expected: Ok(Channel::new("btcusdt", StreamType::Kline).with_interval("1m")),
            },
            TestCase {
                // TC1: uppercase symbol is lowercased on the wire
                input: "ETHUSDT@trade",
                expected: Ok(Channel::new("ethusdt", StreamType::Trade)),
            },
            TestCase {
                // TC2: depth
                input: "btcusdt@depth",
                expected: Ok(Channel::new("btcusdt", StreamType::Depth)),
            },
            TestCase {
                // TC3: aggTrade
                input: "solusdt@aggTrade",
                expected: Ok(Channel::new("solusdt", StreamType::AggTrade)),
            },
            TestCase {
                // TC4: missing separator
                input: "btcusdt-kline",
                expected: Err(()),
            },
            TestCase {
                // TC5: kline without interval
                input: "btcusdt@kline",
                expected: Err(()),
            },
            TestCase {
                // TC6: unsupported stream type
                input: "btcusdt@fundingRate",
                expected: Err(()),
            },
            TestCase {
                // TC7: empty symbol
                input: "@trade",
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Channel::from_str(test.input);
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
    fn test_channel_display_round_trip() {
        for input in ["btcusdt@kline_1m", "ethusdt@trade", "btcusdt@bookTicker"] {
            let channel = Channel::from_str(input).unwrap();
            assert_eq!(channel.to_string(), input);
            assert_eq!(Channel::from_str(&channel.to_string()).unwrap(), channel);
        }
    }

    #[test]
    fn test_canonical_symbol_is_uppercase() {
        let channel = Channel::from_str("btcusdt@trade").unwrap();
        assert_eq!(channel.canonical_symbol().as_str(), "BTCUSDT");
    }

    #[test]
    fn test_subscription_set_deduplicates() {
        let set = SubscriptionSet::new();
        let channel = Channel::from_str("btcusdt@kline_1m").unwrap();

        assert_eq!(set.add(&[channel.clone()]).len(), 1);
        assert_eq!(set.add(&[channel.clone()]).len(), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_subscription_set_subscribe_unsubscribe_round_trip() {
        let set = SubscriptionSet::new();
        let channel = Channel::from_str("btcusdt@trade").unwrap();

        set.add(&[channel.clone()]);
        assert!(set.contains(&channel));

        assert_eq!(set.remove(&[channel.clone()]).len(), 1);
        assert!(set.is_empty());
        assert_eq!(set.remove(&[channel]).len(), 0);
    }

    #[test]
    fn test_subscription_set_snapshot_preserves_insertion_order() {
        let set = SubscriptionSet::new();
        let channels: Vec<Channel> = ["btcusdt@trade", "ethusdt@trade", "solusdt@kline_5m"]
            .into_iter()
            .map(|input| Channel::from_str(input).unwrap())
            .collect();

        set.add(&channels);
        assert_eq!(set.snapshot(), channels);
    }
}
