use crate::{
    statistic::{max_drawdown_pct, sharpe_ratio},
    strategy::StrategyDiagnostic,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kairos_instrument::{Side, instrument::InstrumentId};
use serde::{Deserialize, Serialize};

/// One executed fill. Immutable once recorded.
///
/// `pnl`, `entry_price` and `entry_time` are present only on closing trades; `cost` only on
/// entries and `revenue` only on exits.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Trade {
    pub instrument: InstrumentId,
    pub side: Side,
    pub size: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
    pub cost: Option<f64>,
    pub revenue: Option<f64>,
    pub fees: f64,
    pub pnl: Option<f64>,
    pub entry_price: Option<f64>,
    pub entry_time: Option<DateTime<Utc>>,
    pub forced_exit: bool,
}

impl Trade {
    pub fn is_closing(&self) -> bool {
        self.pnl.is_some()
    }
}

/// Portfolio value at one master-timeline step.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
}

/// Performance statistics derived from the portfolio equity curve and trade list.
///
/// `total_trades`, `winning_trades` and `win_rate_pct` consider closing trades only (entries
/// have no realised pnl to score).
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct TradingSummary {
    pub total_return_pct: f64,
    pub total_pnl: f64,
    pub final_equity: f64,
    pub initial_equity: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate_pct: f64,
    pub total_fees: f64,
}

impl TradingSummary {
    /// Derive the summary from an equity curve and trade list.
    pub fn generate(
        equity_curve: &[EquityPoint],
        trades: &[Trade],
        init_cash: f64,
        annualization_periods: u32,
    ) -> Self {
        let equities: Vec<f64> = equity_curve.iter().map(|point| point.equity).collect();
        let final_equity = equities.last().copied().unwrap_or(init_cash);

        let total_return_pct = if init_cash > 0.0 {
            (final_equity - init_cash) / init_cash * 100.0
        } else {
            0.0
        };

        let closing: Vec<&Trade> = trades.iter().filter(|trade| trade.is_closing()).collect();
        let winning_trades = closing
            .iter()
            .filter(|trade| trade.pnl.unwrap_or(0.0) > 0.0)
            .count();
        let win_rate_pct = if closing.is_empty() {
            0.0
        } else {
            winning_trades as f64 / closing.len() as f64 * 100.0
        };

        Self {
            total_return_pct,
            total_pnl: closing.iter().filter_map(|trade| trade.pnl).sum(),
            final_equity,
            initial_equity: init_cash,
            max_drawdown_pct: max_drawdown_pct(&equities),
            sharpe_ratio: sharpe_ratio(&equities, annualization_periods),
            total_trades: closing.len(),
            winning_trades,
            win_rate_pct,
            total_fees: trades.iter().map(|trade| trade.fees).sum(),
        }
    }
}

/// Per-instrument attribution: the master trade list filtered by instrument.
///
/// There is deliberately no per-instrument equity curve - the shared cash pool makes one
/// uninterpretable.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct InstrumentSummary {
    pub trades: Vec<Trade>,
    pub total_pnl: f64,
    pub trade_count: usize,
}

impl InstrumentSummary {
    pub fn generate(instrument: &InstrumentId, all_trades: &[Trade]) -> Self {
        let trades: Vec<Trade> = all_trades
            .iter()
            .filter(|trade| &trade.instrument == instrument)
            .cloned()
            .collect();

        Self {
            total_pnl: trades.iter().filter_map(|trade| trade.pnl).sum(),
            trade_count: trades.iter().filter(|trade| trade.is_closing()).count(),
            trades,
        }
    }
}

/// Complete result of one portfolio backtest run.
///
/// Always materialises: a run whose strategy faulted on every instrument still returns an
/// equity curve (flat), an empty trade list and the collected diagnostics.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PortfolioBacktest {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub summary: TradingSummary,
    pub instruments: IndexMap<InstrumentId, InstrumentSummary>,
    pub diagnostics: Vec<StrategyDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_instrument::test_utils::instrument;

    fn closing_trade(instrument_id: &InstrumentId, pnl: f64, fees: f64) -> Trade {
        Trade {
            instrument: instrument_id.clone(),
            side: Side::Sell,
            size: 1.0,
            price: 100.0,
            time: Utc::now(),
            cost: None,
            revenue: Some(100.0),
            fees,
            pnl: Some(pnl),
            entry_price: Some(90.0),
            entry_time: Some(Utc::now()),
            forced_exit: false,
        }
    }

    fn entry_trade(instrument_id: &InstrumentId, fees: f64) -> Trade {
        Trade {
            instrument: instrument_id.clone(),
            side: Side::Buy,
            size: 1.0,
            price: 90.0,
            time: Utc::now(),
            cost: Some(90.0 * (1.0 + 0.001)),
            revenue: None,
            fees,
            pnl: None,
            entry_price: None,
            entry_time: None,
            forced_exit: false,
        }
    }

    fn equity_point(equity: f64) -> EquityPoint {
        EquityPoint {
            time: Utc::now(),
            equity,
            cash: equity,
            position_value: 0.0,
        }
    }

    #[test]
    fn test_summary_counts_closing_trades_only() {
        let btc = instrument("BTCUSDT");
        let trades = vec![
            entry_trade(&btc, 0.09),
            closing_trade(&btc, 10.0, 0.1),
            entry_trade(&btc, 0.09),
            closing_trade(&btc, -5.0, 0.1),
        ];
        let curve = vec![equity_point(1_000.0), equity_point(1_005.0)];

        let summary = TradingSummary::generate(&curve, &trades, 1_000.0, 252);

        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.win_rate_pct, 50.0);
        assert!((summary.total_pnl - 5.0).abs() < 1e-12);
        assert!((summary.total_fees - 0.38).abs() < 1e-12);
        assert!((summary.total_return_pct - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_summary_of_empty_run() {
        let summary = TradingSummary::generate(&[], &[], 1_000.0, 252);

        assert_eq!(summary.final_equity, 1_000.0);
        assert_eq!(summary.total_return_pct, 0.0);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate_pct, 0.0);
    }

    #[test]
    fn test_instrument_attribution_filters_by_instrument() {
        let btc = instrument("BTCUSDT");
        let eth = instrument("ETHUSDT");
        let trades = vec![
            closing_trade(&btc, 10.0, 0.1),
            closing_trade(&eth, -2.0, 0.1),
            closing_trade(&btc, 3.0, 0.1),
        ];

        let btc_summary = InstrumentSummary::generate(&btc, &trades);
        assert_eq!(btc_summary.trade_count, 2);
        assert!((btc_summary.total_pnl - 13.0).abs() < 1e-12);

        let eth_summary = InstrumentSummary::generate(&eth, &trades);
        assert_eq!(eth_summary.trade_count, 1);
        assert!((eth_summary.total_pnl + 2.0).abs() < 1e-12);
    }
}
