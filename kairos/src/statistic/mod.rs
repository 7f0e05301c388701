use itertools::Itertools;

/// Arithmetic mean. Returns 0.0 for an empty set.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (Bessel-corrected, n - 1 denominator). Returns 0.0 when fewer than
/// two values are present.
pub fn std_dev_sample(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values
        .iter()
        .map(|value| {
            let deviation = value - mean;
            deviation * deviation
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Simple per-step returns of an equity curve: `r_i = (e_i - e_{i-1}) / e_{i-1}`.
///
/// Steps with a non-positive previous equity are skipped (a bankrupt curve yields no further
/// returns).
pub fn simple_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .iter()
        .tuple_windows()
        .filter(|(previous, _)| **previous > 0.0)
        .map(|(previous, current)| (current - previous) / previous)
        .collect()
}

/// Annualised Sharpe ratio over an equity curve: `mean(r) / std_dev_sample(r) × √periods`.
///
/// Returns 0.0 when the curve has no dispersion (constant equity) or too few points.
pub fn sharpe_ratio(equity: &[f64], annualization_periods: u32) -> f64 {
    let returns = simple_returns(equity);
    let std_dev = std_dev_sample(&returns);
    if std_dev == 0.0 {
        return 0.0;
    }
    mean(&returns) / std_dev * (annualization_periods as f64).sqrt()
}

/// Maximum peak-to-trough drawdown of an equity curve, as a percentage of the peak.
///
/// The peak initialises at the first equity point.
pub fn max_drawdown_pct(equity: &[f64]) -> f64 {
    let Some(first) = equity.first() else {
        return 0.0;
    };

    let mut peak = *first;
    let mut max_drawdown = 0.0;
    for value in equity {
        if *value > peak {
            peak = *value;
        }
        let drawdown = if peak > 0.0 {
            (peak - value) / peak * 100.0
        } else {
            0.0
        };
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }
    max_drawdown
}
