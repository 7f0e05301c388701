use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Portfolio backtest configuration.
///
/// All instruments share one cash pool seeded with `init_cash`. Entry sizing consumes
/// `position_size_pct` of the available cash, clamped to 95% so a single fill can never fully
/// drain the pool.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting cash shared by every instrument.
    pub init_cash: f64,

    /// Proportional fee applied on both entry and exit notional.
    pub fees: f64,

    /// Recognised for venue parity; mark-price fills do not adjust for slippage.
    pub slippage: f64,

    /// Fraction of available cash allocated per entry.
    pub position_size_pct: f64,

    /// Periods per year used to annualise the Sharpe ratio.
    pub annualization_periods: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            init_cash: 100_000.0,
            fees: 0.001,
            slippage: 0.0001,
            position_size_pct: 0.1,
            annualization_periods: 252,
        }
    }
}

impl BacktestConfig {
    /// Validate the configuration, called once when the engine is constructed.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.init_cash.is_finite() || self.init_cash <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "init_cash must be positive, got {}",
                self.init_cash
            )));
        }
        if !(0.0..1.0).contains(&self.fees) {
            return Err(EngineError::InvalidConfig(format!(
                "fees must be within [0.0, 1.0), got {}",
                self.fees
            )));
        }
        if !(0.0..=1.0).contains(&self.position_size_pct) {
            return Err(EngineError::InvalidConfig(format!(
                "position_size_pct must be within [0.0, 1.0], got {}",
                self.position_size_pct
            )));
        }
        if self.annualization_periods == 0 {
            return Err(EngineError::InvalidConfig(
                "annualization_periods must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_cash() {
        let config = BacktestConfig {
            init_cash: 0.0,
            ..BacktestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_position_size_above_one() {
        let config = BacktestConfig {
            position_size_pct: 1.5,
            ..BacktestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_de_with_defaults() {
        let actual = serde_json::from_str::<BacktestConfig>(r#"{"init_cash": 1000.0}"#).unwrap();
        assert_eq!(actual.init_cash, 1000.0);
        assert_eq!(actual.fees, 0.001);
        assert_eq!(actual.annualization_periods, 252);
    }
}
