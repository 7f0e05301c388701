use crate::{
    backtest::{BacktestEngine, market_data::MarketDataSet, summary::PortfolioBacktest},
    config::BacktestConfig,
    error::EngineError,
    strategy::Strategy,
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;
use tracing::info;

/// Shared inputs across a batch of backtests: the market data and engine configuration every
/// variant runs against.
#[derive(Clone, PartialEq, Debug)]
pub struct BacktestArgsConstant {
    pub market_data: MarketDataSet,
    pub config: BacktestConfig,
}

/// Per-variant inputs: an identifier and the strategy factory defining the variant.
#[derive(Debug)]
pub struct BacktestArgsDynamic<F> {
    /// Unique identifier for this backtest variant.
    pub id: SmolStr,
    /// Factory producing one independent strategy replica per instrument.
    pub strategy_factory: F,
}

/// Result of one batch variant.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BacktestSummary {
    pub id: SmolStr,
    pub backtest: PortfolioBacktest,
}

/// Results of a batch of backtests plus the wall-clock duration of the whole batch.
#[derive(Clone, PartialEq, Debug)]
pub struct MultiBacktestSummary {
    pub duration: Duration,
    pub summaries: Vec<BacktestSummary>,
}

/// Run multiple backtests over the same market data, each with different strategy parameters.
///
/// Variants are independent (each gets its own engine and strategy replicas), so they execute
/// on parallel threads; results are collected in input order.
pub fn run_backtests<S, F>(
    args_constant: &BacktestArgsConstant,
    args_dynamic: Vec<BacktestArgsDynamic<F>>,
) -> Result<MultiBacktestSummary, EngineError>
where
    S: Strategy,
    F: FnMut() -> S + Send,
{
    let time_start = std::time::Instant::now();
    let num_variants = args_dynamic.len();

    let summaries = std::thread::scope(|scope| {
        let handles: Vec<_> = args_dynamic
            .into_iter()
            .map(|mut variant| {
                scope.spawn(move || {
                    let engine = BacktestEngine::new(args_constant.config.clone())?;
                    let backtest =
                        engine.run(&args_constant.market_data, &mut variant.strategy_factory)?;
                    Ok(BacktestSummary {
                        id: variant.id,
                        backtest,
                    })
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(summary) => summary,
                Err(_) => Err(EngineError::InvalidConfig(
                    "backtest variant thread panicked".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, EngineError>>()
    })?;

    let duration = time_start.elapsed();
    info!(num_variants, ?duration, "backtest batch complete");

    Ok(MultiBacktestSummary {
        duration,
        summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::sma_cross::SmaCross;
    use chrono::{TimeDelta, Utc};
    use kairos_instrument::{
        instrument::{InstrumentId, Venue},
        test_utils,
    };

    #[test]
    fn test_batch_runs_variants_in_input_order() {
        let start = Utc::now();
        let bars: Vec<_> = (0..120)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.4).sin() * 6.0 + i as f64 * 0.02;
                test_utils::bar(start + TimeDelta::hours(i), price)
            })
            .collect();

        let mut market_data = MarketDataSet::new();
        market_data
            .insert(InstrumentId::new("BTCUSDT", Venue::Simulated), bars)
            .unwrap();

        let args_constant = BacktestArgsConstant {
            market_data,
            config: BacktestConfig {
                init_cash: 10_000.0,
                ..BacktestConfig::default()
            },
        };

        let variants = vec![
            BacktestArgsDynamic {
                id: SmolStr::new_static("sma_3_9"),
                strategy_factory: Box::new(|| SmaCross::new(3, 9)) as Box<dyn FnMut() -> SmaCross + Send>,
            },
            BacktestArgsDynamic {
                id: SmolStr::new_static("sma_5_20"),
                strategy_factory: Box::new(|| SmaCross::new(5, 20)) as Box<dyn FnMut() -> SmaCross + Send>,
            },
        ];

        let result = run_backtests(&args_constant, variants).unwrap();

        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.summaries[0].id.as_str(), "sma_3_9");
        assert_eq!(result.summaries[1].id.as_str(), "sma_5_20");
        for summary in &result.summaries {
            assert_eq!(summary.backtest.equity_curve.len(), 120);
        }
    }

    #[test]
    fn test_batch_rejects_invalid_config() {
        let start = Utc::now();
        let mut market_data = MarketDataSet::new();
        market_data
            .insert(
                InstrumentId::new("BTCUSDT", Venue::Simulated),
                vec![test_utils::bar(start, 100.0)],
            )
            .unwrap();

        let args_constant = BacktestArgsConstant {
            market_data,
            config: BacktestConfig {
                init_cash: -1.0,
                ..BacktestConfig::default()
            },
        };

        let variants = vec![BacktestArgsDynamic {
            id: SmolStr::new_static("broken"),
            strategy_factory: || SmaCross::new(2, 4),
        }];

        assert!(run_backtests(&args_constant, variants).is_err());
    }
}
