use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::EnumIter;
use strum_macros::{Display, EnumString};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// Represents a price level in the quote currency.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(pub f64);

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<Price> for f64 {
    fn from(price: Price) -> Self {
        price.0
    }
}

/// Represents aggregated traded size over a bar's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Volume(pub f64);

impl From<f64> for Volume {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

// ================================================================================================
// Bars
// ================================================================================================

/// One OHLC candle.
///
/// The timestamp is Eastern wall-clock time (see [`crate::calendar`]);
/// within one stored series timestamps are strictly increasing, which the
/// [`TimeframeStore`](crate::data::store::TimeframeStore) enforces on
/// append.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
}

impl Bar {
    pub fn new(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: Price(open),
            high: Price(high),
            low: Price(low),
            close: Price(close),
            volume: Volume(volume),
        }
    }
}

// ================================================================================================
// Timeframes
// ================================================================================================

/// The fixed set of bar periods the engine works with.
///
/// Annualization assumes 252 trading days of 6.5 trading hours each; the
/// intraday factors divide that trading year, not the calendar year.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum Timeframe {
    #[strum(serialize = "1m")]
    M1,

    #[strum(serialize = "5m")]
    M5,

    #[strum(serialize = "15m")]
    M15,

    #[strum(serialize = "1h")]
    H1,

    #[strum(serialize = "4h")]
    H4,

    #[strum(serialize = "1d")]
    D1,
}

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const TRADING_HOURS_PER_YEAR: f64 = TRADING_DAYS_PER_YEAR * 6.5;

impl Timeframe {
    /// Every timeframe the store tracks, lowest first.
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Higher timeframes used for parameter estimation, in selection
    /// preference order.
    pub const HIGHER: [Timeframe; 3] = [Timeframe::D1, Timeframe::H4, Timeframe::H1];

    /// Lower timeframes used for live tracking.
    pub const LOWER: [Timeframe; 3] = [Timeframe::M15, Timeframe::M5, Timeframe::M1];

    /// Number of bar periods in one trading year.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Timeframe::M1 => TRADING_HOURS_PER_YEAR * 60.0,
            Timeframe::M5 => TRADING_HOURS_PER_YEAR * 12.0,
            Timeframe::M15 => TRADING_HOURS_PER_YEAR * 4.0,
            Timeframe::H1 => TRADING_HOURS_PER_YEAR,
            Timeframe::H4 => TRADING_HOURS_PER_YEAR / 4.0,
            Timeframe::D1 => TRADING_DAYS_PER_YEAR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn timeframe_round_trips_through_strings() {
        for tf in Timeframe::iter() {
            let parsed = Timeframe::from_str(&tf.to_string()).unwrap();
            assert_eq!(parsed, tf);
        }
        assert_eq!(Timeframe::from_str("1d").unwrap(), Timeframe::D1);
        assert!(Timeframe::from_str("2h").is_err());
    }

    #[test]
    fn iteration_matches_the_store_key_set() {
        let iterated: Vec<Timeframe> = Timeframe::iter().collect();
        assert_eq!(iterated, Timeframe::ALL.to_vec());
    }

    #[test]
    fn annualization_factors() {
        assert_eq!(Timeframe::D1.periods_per_year(), 252.0);
        assert_eq!(Timeframe::H1.periods_per_year(), 252.0 * 6.5);
        assert_eq!(Timeframe::H4.periods_per_year(), 252.0 * 6.5 / 4.0);
        assert_eq!(Timeframe::M1.periods_per_year(), 252.0 * 6.5 * 60.0);
    }
}
