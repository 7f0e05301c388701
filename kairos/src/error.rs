use thiserror::Error;

/// All errors generated in `kairos`.
///
/// The backtest hot loop is error-free by construction: strategy faults, missing bars and
/// unaffordable fills degrade per the engine's failure rules instead of unwinding. Errors here
/// reject a run before it starts (validation) or report composition failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid backtest configuration: {0}")]
    InvalidConfig(String),

    #[error("market data is empty - at least one instrument with bars is required")]
    MarketDataEmpty,

    #[error("bars for instrument {instrument} are empty")]
    BarsEmpty { instrument: String },

    #[error("bars for instrument {instrument} are not in ascending time order at index {index}")]
    BarsUnordered { instrument: String, index: usize },

    #[error("instruments share no common time range")]
    NoCommonTimeRange,

    #[error("dispatch error: {0}")]
    Dispatch(#[from] kairos_dispatch::DispatchError),

    #[error("market data error: {0}")]
    Data(#[from] kairos_data::DataError),
}
