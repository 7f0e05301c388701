use super::{Decision, Strategy};
use kairos_instrument::bar::Bar;
use std::collections::VecDeque;

/// Simple moving average cross strategy.
///
/// Emits [`Decision::Long`] when the fast average crosses above the slow average, and
/// [`Decision::CloseLong`] when it crosses back below. Emits nothing until the slow window is
/// full.
#[derive(Clone, Debug)]
pub struct SmaCross {
    fast_window: usize,
    slow_window: usize,
    closes: VecDeque<f64>,
    was_fast_above: Option<bool>,
}

impl SmaCross {
    pub fn new(fast_window: usize, slow_window: usize) -> Self {
        assert!(
            fast_window < slow_window,
            "fast window must be shorter than slow window"
        );
        Self {
            fast_window,
            slow_window,
            closes: VecDeque::with_capacity(slow_window),
            was_fast_above: None,
        }
    }

    fn sma(&self, window: usize) -> f64 {
        self.closes.iter().rev().take(window).sum::<f64>() / window as f64
    }
}

impl Strategy for SmaCross {
    fn on_init(&mut self) {
        self.closes.clear();
        self.was_fast_above = None;
    }

    fn on_bar(&mut self, bar: &Bar) -> Option<Decision> {
        if self.closes.len() >= self.slow_window {
            self.closes.pop_front();
        }
        self.closes.push_back(bar.close);

        if self.closes.len() < self.slow_window {
            return None;
        }

        let fast = self.sma(self.fast_window);
        let slow = self.sma(self.slow_window);
        let fast_above = fast > slow;

        let decision = match self.was_fast_above {
            Some(was_above) if !was_above && fast_above => Some(Decision::Long),
            Some(was_above) if was_above && !fast_above => Some(Decision::CloseLong),
            _ => None,
        };

        self.was_fast_above = Some(fast_above);
        decision
    }
}
