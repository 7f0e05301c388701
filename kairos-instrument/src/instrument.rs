use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// Venue (exchange) an [`InstrumentId`] trades on.
///
/// [`Venue::Simulated`] is used by backtests and deterministic tests that never touch a live
/// market data connection.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Binance,
    Simulated,
}

impl Venue {
    /// Venue name in its canonical lowercase form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Simulated => "simulated",
        }
    }
}

impl Display for Venue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Venue {
    type Err = ParseInstrumentError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "binance" => Ok(Venue::Binance),
            "simulated" => Ok(Venue::Simulated),
            other => Err(ParseInstrumentError(format!("unknown venue: {other}"))),
        }
    }
}

/// Error produced when parsing an [`InstrumentId`] or [`Venue`] from its string form.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseInstrumentError(pub String);

impl Display for ParseInstrumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse instrument: {}", self.0)
    }
}

impl std::error::Error for ParseInstrumentError {}

/// Unique identifier for a tradeable instrument on a specific [`Venue`].
///
/// Value-equal, cheap to clone, and used as the map key throughout the portfolio engine.
/// Serialises to the canonical `"<SYMBOL>.<venue>"` string form (eg/ "BTCUSDT.binance") so
/// instrument-keyed maps stay exchangeable as JSON.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct InstrumentId {
    pub symbol: SmolStr,
    pub venue: Venue,
}

impl InstrumentId {
    /// Construct an [`InstrumentId`], canonicalising the symbol to UPPERCASE.
    pub fn new<S>(symbol: S, venue: Venue) -> Self
    where
        S: AsRef<str>,
    {
        Self {
            symbol: SmolStr::new(symbol.as_ref().to_uppercase()),
            venue,
        }
    }
}

impl Display for InstrumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.symbol, self.venue)
    }
}

impl FromStr for InstrumentId {
    type Err = ParseInstrumentError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (symbol, venue) = input.rsplit_once('.').ok_or_else(|| {
            ParseInstrumentError(format!("missing '.' venue separator in '{input}'"))
        })?;
        if symbol.is_empty() {
            return Err(ParseInstrumentError(format!("empty symbol in '{input}'")));
        }
        Ok(Self::new(symbol, Venue::from_str(venue)?))
    }
}

impl Serialize for InstrumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstrumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let input = <&str as Deserialize>::deserialize(deserializer)?;
        InstrumentId::from_str(input).map_err(serde::de::Error::custom)
    }
}
