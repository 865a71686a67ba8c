use thiserror::Error;

pub type DriftwatchResult<T> = Result<T, DriftwatchError>;

#[derive(Debug, Error)]
pub enum DriftwatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Errors raised while validating a session configuration.
///
/// These are always fatal and are surfaced before any update loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Ticker symbol must not be empty")]
    EmptyTicker,

    #[error("Tolerance must lie in (0, 1), got {0}")]
    ToleranceOutOfRange(f64),

    #[error("Forecast horizon must cover at least one minute, got {0}")]
    InvalidHorizon(usize),

    #[error("Path count must be at least 1, got {0}")]
    InvalidPathCount(usize),

    #[error("Update interval must be at least one second")]
    InvalidUpdateInterval,

    #[error("History window must cover at least one day, got {0}")]
    InvalidHistoryDays(i64),

    #[error("Zone limit must be at least 1")]
    InvalidZoneLimit,

    #[error("Invalid starting price '{0}': expected 'weekly-open', 'daily-open' or a positive number")]
    InvalidStartingPrice(String),
}

/// Errors related to market data retrieval and availability.
#[derive(Debug, Error)]
pub enum DataError {
    /// Transient per-timeframe fetch failure. Absorbed inside an update
    /// cycle; never fatal on its own.
    #[error("Fetch failed for {timeframe} bars: {msg}")]
    Fetch { timeframe: String, msg: String },

    #[error("Request for {0} bars exceeded its deadline")]
    Timeout(String),

    #[error("No timeframe has enough history to estimate drift and volatility")]
    NoUsableHistory,

    #[error("Could not resolve an anchor price for '{0}'")]
    AnchorUnresolved(String),
}

/// Errors related to internal simulation invariants. These indicate a
/// caller bug and are propagated, never absorbed.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Observed price must be positive, got {0}")]
    InvalidObservedPrice(f64),

    #[error("Path index {index} out of bounds for a population of {count} paths")]
    PathIndexOutOfBounds { index: usize, count: usize },
}
