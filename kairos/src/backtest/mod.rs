use crate::{
    backtest::{
        market_data::{AlignedData, MarketDataSet},
        summary::{EquityPoint, InstrumentSummary, PortfolioBacktest, Trade, TradingSummary},
    },
    config::BacktestConfig,
    error::EngineError,
    portfolio::PortfolioState,
    strategy::{SignalSeries, Strategy, StrategyDiagnostic, generate_signals},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kairos_instrument::{Side, instrument::InstrumentId};
use std::{fmt, sync::Arc};
use tracing::{debug, info};

/// Batch execution of many strategy variants over shared market data.
pub mod batch;

/// Instrument-price source types and time alignment.
pub mod market_data;

/// Result types: trades, equity curve, trading summary, per-instrument attribution.
pub mod summary;

/// Observer invoked with every recorded [`EquityPoint`], letting callers forward marks into an
/// event dispatcher for observability without the engine holding a dispatcher reference.
pub type EquityObserver = Arc<dyn Fn(&EquityPoint) + Send + Sync>;

/// Deterministic multi-instrument portfolio backtest engine.
///
/// All instruments consume one shared cash pool. Signals are produced in a pre-pass that
/// replays an independent strategy replica per instrument; the master loop then walks a single
/// aligned timeline performing mark-to-market, exits, entries and the end-of-run forced-exit
/// sweep. The hot loop is single-threaded and allocation-light - determinism is the contract.
pub struct BacktestEngine {
    config: BacktestConfig,
    observer: Option<EquityObserver>,
}

impl fmt::Debug for BacktestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacktestEngine")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl BacktestEngine {
    /// Construct an engine, validating the configuration.
    pub fn new(config: BacktestConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            observer: None,
        })
    }

    /// Attach an [`EquityObserver`] receiving every equity point as it is recorded.
    pub fn with_equity_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&EquityPoint) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Run a portfolio backtest over the provided market data.
    ///
    /// `strategy_factory` is invoked once per instrument so every instrument replays against an
    /// independent strategy replica - per-symbol state never bleeds between instruments.
    pub fn run<S, F>(
        &self,
        market_data: &MarketDataSet,
        mut strategy_factory: F,
    ) -> Result<PortfolioBacktest, EngineError>
    where
        S: Strategy,
        F: FnMut() -> S,
    {
        let aligned = market_data.align()?;
        let (signals, diagnostics) = pre_pass(&aligned, &mut strategy_factory);

        let mut portfolio = PortfolioState::new(self.config.init_cash);
        for instrument in aligned.instruments.keys() {
            portfolio.add_instrument(instrument.clone());
        }

        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(aligned.timeline.len());
        let mut trades: Vec<Trade> = Vec::new();

        for &time in &aligned.timeline {
            self.mark_to_market(&aligned, &mut portfolio, time, &mut equity_curve);
            self.process_fills(&aligned, &signals, &mut portfolio, time, &mut trades);
        }

        self.sweep_open_positions(&aligned, &mut portfolio, &mut trades);

        let summary = TradingSummary::generate(
            &equity_curve,
            &trades,
            self.config.init_cash,
            self.config.annualization_periods,
        );
        let instruments = aligned
            .instruments
            .keys()
            .map(|instrument| {
                (
                    instrument.clone(),
                    InstrumentSummary::generate(instrument, &trades),
                )
            })
            .collect();

        info!(
            instruments = aligned.instruments.len(),
            steps = aligned.timeline.len(),
            total_trades = summary.total_trades,
            final_equity = summary.final_equity,
            "portfolio backtest complete"
        );

        Ok(PortfolioBacktest {
            equity_curve,
            trades,
            summary,
            instruments,
            diagnostics,
        })
    }

    /// Steps 1-3 at one timestamp: gather closes, re-mark equity, record the equity point.
    fn mark_to_market(
        &self,
        aligned: &AlignedData,
        portfolio: &mut PortfolioState,
        time: DateTime<Utc>,
        equity_curve: &mut Vec<EquityPoint>,
    ) {
        let mut current_prices = IndexMap::with_capacity(aligned.instruments.len());
        for (instrument, aligned_instrument) in &aligned.instruments {
            if let Some(bar) = aligned_instrument.bar_at(time) {
                current_prices.insert(instrument.clone(), bar.close);
            }
        }

        portfolio.update_equity(&current_prices);
        let point = EquityPoint {
            time,
            equity: portfolio.total_equity,
            cash: portfolio.cash,
            position_value: portfolio.total_equity - portfolio.cash,
        };

        if let Some(observer) = &self.observer {
            observer(&point);
        }
        equity_curve.push(point);
    }

    /// Steps 4-5 at one timestamp: consult pre-computed signals per instrument in stable
    /// insertion order. Exits are evaluated before entries so a flip closes then opens.
    /// Instruments with no bar at this timestamp are skipped - no extrapolation.
    fn process_fills(
        &self,
        aligned: &AlignedData,
        signals: &IndexMap<InstrumentId, SignalSeries>,
        portfolio: &mut PortfolioState,
        time: DateTime<Utc>,
        trades: &mut Vec<Trade>,
    ) {
        for (instrument, aligned_instrument) in &aligned.instruments {
            let Some(bar_index) = aligned_instrument.index_by_time.get(&time).copied() else {
                continue;
            };
            let price = aligned_instrument.bars[bar_index].close;
            let Some(series) = signals.get(instrument) else {
                continue;
            };

            if series.exits.get(bar_index).copied().unwrap_or(false) {
                if let Some(trade) = self.try_exit(portfolio, instrument, price, time, false) {
                    trades.push(trade);
                }
            }
            if series.entries.get(bar_index).copied().unwrap_or(false) {
                if let Some(trade) = self.try_enter(portfolio, instrument, price, time) {
                    trades.push(trade);
                }
            }
        }
    }

    /// End-of-run sweep: force-exit every still-open position at its final aligned close.
    fn sweep_open_positions(
        &self,
        aligned: &AlignedData,
        portfolio: &mut PortfolioState,
        trades: &mut Vec<Trade>,
    ) {
        let Some(&final_time) = aligned.timeline.last() else {
            return;
        };

        let open: Vec<InstrumentId> = portfolio
            .positions
            .iter()
            .filter(|(_, position)| position.is_open())
            .map(|(instrument, _)| instrument.clone())
            .collect();

        for instrument in open {
            let Some(aligned_instrument) = aligned.instruments.get(&instrument) else {
                continue;
            };
            // Prefer the bar at the final master timestamp; fall back to the instrument's own
            // last bar so no position survives the sweep
            let Some(bar) = aligned_instrument
                .bar_at(final_time)
                .or_else(|| aligned_instrument.bars.last())
            else {
                continue;
            };

            if let Some(trade) = self.try_exit(portfolio, &instrument, bar.close, bar.time, true) {
                debug!(%instrument, price = bar.close, "forced exit at end of run");
                trades.push(trade);
            }
        }
    }

    /// Entry fill: `trade_cash = min(cash × position_size_pct, cash × 0.95)`,
    /// `size = trade_cash / price`, `cost = size × price × (1 + fees)`. Skips on non-positive
    /// price, an already-open position, or insufficient cash (no partial fills).
    fn try_enter(
        &self,
        portfolio: &mut PortfolioState,
        instrument: &InstrumentId,
        price: f64,
        time: DateTime<Utc>,
    ) -> Option<Trade> {
        if price <= 0.0 {
            return None;
        }
        if portfolio
            .positions
            .get(instrument)
            .is_none_or(|position| position.is_open())
        {
            return None;
        }

        let available = portfolio.cash;
        let trade_cash = (available * self.config.position_size_pct).min(available * 0.95);
        if trade_cash <= 0.0 {
            return None;
        }

        let size = trade_cash / price;
        let cost = size * price * (1.0 + self.config.fees);
        if portfolio.cash < cost {
            return None;
        }

        portfolio.cash -= cost;
        portfolio
            .positions
            .get_mut(instrument)?
            .open(size, price, time);

        Some(Trade {
            instrument: instrument.clone(),
            side: Side::Buy,
            size,
            price,
            time,
            cost: Some(cost),
            revenue: None,
            fees: size * price * self.config.fees,
            pnl: None,
            entry_price: None,
            entry_time: None,
            forced_exit: false,
        })
    }

    /// Exit fill: `revenue = size × price × (1 − fees)`,
    /// `pnl = size × (price − entry_price) − size × price × fees`.
    fn try_exit(
        &self,
        portfolio: &mut PortfolioState,
        instrument: &InstrumentId,
        price: f64,
        time: DateTime<Utc>,
        forced_exit: bool,
    ) -> Option<Trade> {
        if price <= 0.0 {
            return None;
        }

        let position = portfolio.positions.get(instrument)?;
        if !position.is_open() {
            return None;
        }
        let size = position.size;
        let entry_price = position.entry_price;
        let entry_time = position.entry_time;

        let revenue = size * price * (1.0 - self.config.fees);
        let pnl = size * (price - entry_price) - size * price * self.config.fees;

        portfolio.cash += revenue;
        portfolio.positions.get_mut(instrument)?.close();

        Some(Trade {
            instrument: instrument.clone(),
            side: Side::Sell,
            size,
            price,
            time,
            cost: None,
            revenue: Some(revenue),
            fees: size * price * self.config.fees,
            pnl: Some(pnl),
            entry_price: Some(entry_price),
            entry_time,
            forced_exit,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }
}

/// Signal generation pre-pass: one independent strategy replica per instrument.
fn pre_pass<S, F>(
    aligned: &AlignedData,
    strategy_factory: &mut F,
) -> (IndexMap<InstrumentId, SignalSeries>, Vec<StrategyDiagnostic>)
where
    S: Strategy,
    F: FnMut() -> S,
{
    let mut signals = IndexMap::with_capacity(aligned.instruments.len());
    let mut diagnostics = Vec::new();

    for (instrument, aligned_instrument) in &aligned.instruments {
        let mut replica = strategy_factory();
        let (series, fault) = generate_signals(&mut replica, instrument, &aligned_instrument.bars);
        if let Some(diagnostic) = fault {
            diagnostics.push(diagnostic);
        }
        signals.insert(instrument.clone(), series);
    }

    (signals, diagnostics)
}
