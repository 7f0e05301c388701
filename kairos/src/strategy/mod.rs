use chrono::{DateTime, Utc};
use kairos_instrument::{bar::Bar, instrument::InstrumentId};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Simple moving average cross strategy.
pub mod sma_cross;

/// Intent emitted by a [`Strategy`] after observing a bar.
///
/// `Long` opens a position; everything else flattens one. The backtest engine models long-only
/// mark-price fills, so `Short` is interpreted as an exit rather than a short entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum Decision {
    Long,
    Short,
    CloseLong,
    CloseShort,
}

impl Decision {
    pub fn is_entry(&self) -> bool {
        matches!(self, Decision::Long)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Decision::Short | Decision::CloseLong | Decision::CloseShort)
    }
}

/// Capability interface implemented by trading strategies.
///
/// One replica is constructed per instrument for signal generation, so implementations are free
/// to keep per-symbol state (indicator windows, position memory) without cross-contamination.
pub trait Strategy {
    /// Called once before the first bar.
    fn on_init(&mut self) {}

    /// Observe one bar and optionally emit a [`Decision`].
    fn on_bar(&mut self, bar: &Bar) -> Option<Decision>;

    /// Called once after the final bar. Decisions emitted here are ignored - end-of-run
    /// position flattening is the engine's forced-exit sweep, not the strategy's.
    fn on_stop(&mut self, last_bar: &Bar) {
        let _ = last_bar;
    }
}

/// Entry/exit flags for one instrument, indexed in lockstep with its aligned bars.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SignalSeries {
    pub entries: Vec<bool>,
    pub exits: Vec<bool>,
}

impl SignalSeries {
    fn with_len(len: usize) -> Self {
        Self {
            entries: vec![false; len],
            exits: vec![false; len],
        }
    }
}

/// Diagnostic recorded when a strategy replica faults during the signal pre-pass.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct StrategyDiagnostic {
    pub instrument: InstrumentId,
    pub time: DateTime<Utc>,
    pub reason: String,
}

/// Replay a fresh strategy replica over one instrument's bars, translating its decisions into
/// entry/exit signals.
///
/// A strategy fault (panic) is caught once per instrument: signals generated before the fault
/// are kept, the instrument produces no signals thereafter, and a [`StrategyDiagnostic`] is
/// returned alongside the partial series.
pub fn generate_signals<S>(
    strategy: &mut S,
    instrument: &InstrumentId,
    bars: &[Bar],
) -> (SignalSeries, Option<StrategyDiagnostic>)
where
    S: Strategy,
{
    let mut signals = SignalSeries::with_len(bars.len());

    if let Err(fault) = panic::catch_unwind(AssertUnwindSafe(|| strategy.on_init())) {
        let diagnostic = diagnostic(instrument, bars.first(), fault);
        warn!(%instrument, reason = %diagnostic.reason, "strategy faulted in on_init");
        return (signals, Some(diagnostic));
    }

    for (index, bar) in bars.iter().enumerate() {
        let decision = match panic::catch_unwind(AssertUnwindSafe(|| strategy.on_bar(bar))) {
            Ok(decision) => decision,
            Err(fault) => {
                let diagnostic = diagnostic(instrument, Some(bar), fault);
                warn!(
                    %instrument,
                    bar_index = index,
                    reason = %diagnostic.reason,
                    "strategy faulted in on_bar - freezing signals for this instrument"
                );
                return (signals, Some(diagnostic));
            }
        };

        match decision {
            Some(decision) if decision.is_entry() => signals.entries[index] = true,
            Some(decision) if decision.is_exit() => signals.exits[index] = true,
            _ => {}
        }
    }

    if let Some(last_bar) = bars.last() {
        // Decisions emitted by on_stop are deliberately ignored
        if let Err(fault) = panic::catch_unwind(AssertUnwindSafe(|| strategy.on_stop(last_bar))) {
            let diagnostic = diagnostic(instrument, Some(last_bar), fault);
            warn!(%instrument, reason = %diagnostic.reason, "strategy faulted in on_stop");
            return (signals, Some(diagnostic));
        }
    }

    (signals, None)
}

fn diagnostic(
    instrument: &InstrumentId,
    bar: Option<&Bar>,
    fault: Box<dyn std::any::Any + Send>,
) -> StrategyDiagnostic {
    let reason = fault
        .downcast_ref::<&str>()
        .map(|reason| reason.to_string())
        .or_else(|| fault.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "strategy panicked".to_string());

    StrategyDiagnostic {
        instrument: instrument.clone(),
        time: bar.map(|bar| bar.time).unwrap_or_else(Utc::now),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_instrument::test_utils::{bar, instrument};
    use chrono::TimeDelta;

    fn bars(count: usize) -> Vec<Bar> {
        let start = Utc::now();
        (0..count)
            .map(|i| bar(start + TimeDelta::hours(i as i64), 100.0 + i as f64))
            .collect()
    }

    struct AlternatingStrategy {
        initialised: bool,
        stopped: bool,
        count: usize,
    }

    impl Strategy for AlternatingStrategy {
        fn on_init(&mut self) {
            self.initialised = true;
        }

        fn on_bar(&mut self, _: &Bar) -> Option<Decision> {
            self.count += 1;
            match self.count % 2 {
                1 => Some(Decision::Long),
                _ => Some(Decision::CloseLong),
            }
        }

        fn on_stop(&mut self, _: &Bar) {
            self.stopped = true;
        }
    }

    #[test]
    fn test_generate_signals_translates_decisions() {
        let mut strategy = AlternatingStrategy {
            initialised: false,
            stopped: false,
            count: 0,
        };

        let (signals, fault) = generate_signals(&mut strategy, &instrument("BTCUSDT"), &bars(4));

        assert!(fault.is_none());
        assert!(strategy.initialised);
        assert!(strategy.stopped);
        assert_eq!(signals.entries, vec![true, false, true, false]);
        assert_eq!(signals.exits, vec![false, true, false, true]);
    }

    struct FaultyStrategy {
        fault_at: usize,
        count: usize,
    }

    impl Strategy for FaultyStrategy {
        fn on_bar(&mut self, _: &Bar) -> Option<Decision> {
            self.count += 1;
            if self.count > self.fault_at {
                panic!("indicator window underflow");
            }
            Some(Decision::Long)
        }
    }

    #[test]
    fn test_strategy_fault_freezes_signals() {
        let mut strategy = FaultyStrategy {
            fault_at: 2,
            count: 0,
        };

        let (signals, fault) = generate_signals(&mut strategy, &instrument("BTCUSDT"), &bars(5));

        let fault = fault.unwrap();
        assert!(fault.reason.contains("indicator window underflow"));
        // Signals before the fault survive; nothing after it
        assert_eq!(signals.entries, vec![true, true, false, false, false]);
        assert_eq!(signals.exits, vec![false; 5]);
    }

    #[test]
    fn test_decision_classification() {
        assert!(Decision::Long.is_entry());
        assert!(!Decision::Long.is_exit());
        for decision in [Decision::Short, Decision::CloseLong, Decision::CloseShort] {
            assert!(decision.is_exit());
            assert!(!decision.is_entry());
        }
    }
}
