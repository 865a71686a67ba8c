use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::{
    data::domain::{Bar, Timeframe},
    error::DataError,
};

/// Minimal contract a market-data vendor client must satisfy.
///
/// Implementations live outside the engine (HTTP clients, replay files,
/// test scripts). Timestamps on returned bars must already be Eastern
/// wall-clock time; [`crate::calendar::to_eastern`] is the conversion
/// point for vendors that hand out aware UTC instants.
///
/// Subscription or feed restrictions should surface as
/// [`DataError::Fetch`] carrying the vendor message; the engine treats
/// any source error as a per-timeframe skip, never as a session failure.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Fetch historical bars for `symbol` over `[start, end]`, oldest
    /// first. `limit` caps the number of bars when the vendor supports
    /// it.
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDateTime,
        end: NaiveDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, DataError>;

    /// The most recent bar for `symbol`, or `None` when the vendor has
    /// nothing yet (e.g. outside trading hours on a fresh listing).
    async fn latest_bar(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Bar>, DataError>;
}
