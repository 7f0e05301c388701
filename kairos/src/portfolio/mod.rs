use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kairos_instrument::instrument::InstrumentId;
use serde::{Deserialize, Serialize};

/// Open position for one instrument. Exactly one [`Position`] exists per instrument at any
/// time; a flat position has `size == 0`.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub size: f64,
    pub entry_price: f64,
    pub entry_time: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            size: 0.0,
            entry_price: 0.0,
            entry_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.size != 0.0
    }

    /// Mark-to-market value at the provided price.
    pub fn value(&self, current_price: f64) -> f64 {
        self.size * current_price
    }

    pub fn open(&mut self, size: f64, price: f64, time: DateTime<Utc>) {
        self.size = size;
        self.entry_price = price;
        self.entry_time = Some(time);
    }

    pub fn close(&mut self) {
        self.size = 0.0;
        self.entry_price = 0.0;
        self.entry_time = None;
    }
}

/// Shared-cash-pool portfolio state, owned exclusively by the backtest engine.
///
/// Invariant at every mark: `total_equity == cash + Σ positions[s].size × current_price[s]`.
/// Positions iterate in instrument insertion order, which is also the engine's fill order.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub positions: IndexMap<InstrumentId, Position>,
    pub total_equity: f64,
}

impl PortfolioState {
    pub fn new(init_cash: f64) -> Self {
        Self {
            cash: init_cash,
            positions: IndexMap::new(),
            total_equity: init_cash,
        }
    }

    /// Register an instrument with a flat position. Idempotent.
    pub fn add_instrument(&mut self, instrument: InstrumentId) {
        self.positions
            .entry(instrument.clone())
            .or_insert_with(|| Position::flat(instrument));
    }

    /// Total mark-to-market value of open positions, using only instruments present in
    /// `current_prices`.
    pub fn position_value(&self, current_prices: &IndexMap<InstrumentId, f64>) -> f64 {
        self.positions
            .iter()
            .filter(|(_, position)| position.is_open())
            .filter_map(|(instrument, position)| {
                current_prices
                    .get(instrument)
                    .map(|price| position.value(*price))
            })
            .sum()
    }

    /// Re-mark `total_equity` against the provided prices.
    pub fn update_equity(&mut self, current_prices: &IndexMap<InstrumentId, f64>) {
        self.total_equity = self.cash + self.position_value(current_prices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_instrument::test_utils::instrument;

    #[test]
    fn test_position_open_close() {
        let mut position = Position::flat(instrument("BTCUSDT"));
        assert!(!position.is_open());

        position.open(0.5, 40_000.0, Utc::now());
        assert!(position.is_open());
        assert_eq!(position.value(42_000.0), 21_000.0);

        position.close();
        assert!(!position.is_open());
        assert_eq!(position.value(42_000.0), 0.0);
    }

    #[test]
    fn test_update_equity_marks_open_positions() {
        let mut portfolio = PortfolioState::new(1_000.0);
        let btc = instrument("BTCUSDT");
        let eth = instrument("ETHUSDT");
        portfolio.add_instrument(btc.clone());
        portfolio.add_instrument(eth.clone());

        portfolio.cash = 500.0;
        portfolio
            .positions
            .get_mut(&btc)
            .unwrap()
            .open(5.0, 100.0, Utc::now());

        let mut prices = IndexMap::new();
        prices.insert(btc, 110.0);
        prices.insert(eth, 50.0);

        portfolio.update_equity(&prices);
        assert_eq!(portfolio.total_equity, 500.0 + 5.0 * 110.0);
    }

    #[test]
    fn test_position_value_skips_missing_prices() {
        let mut portfolio = PortfolioState::new(1_000.0);
        let btc = instrument("BTCUSDT");
        portfolio.add_instrument(btc.clone());
        portfolio
            .positions
            .get_mut(&btc)
            .unwrap()
            .open(1.0, 100.0, Utc::now());

        // No price for BTCUSDT at this step - no extrapolation
        assert_eq!(portfolio.position_value(&IndexMap::new()), 0.0);
    }
}
