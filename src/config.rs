use std::{str::FromStr, time::Duration};

use crate::error::ConfigError;

/// Where a session anchors its trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StartingPrice {
    /// The close nearest the most recent Monday 09:30 ET.
    #[default]
    WeeklyOpen,

    /// The close nearest the most recent 09:30 ET.
    DailyOpen,

    /// An explicit price, anchored at session start time.
    Fixed(f64),
}

impl FromStr for StartingPrice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly-open" => Ok(StartingPrice::WeeklyOpen),
            "daily-open" => Ok(StartingPrice::DailyOpen),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|price| price.is_finite() && *price > 0.0)
                .map(StartingPrice::Fixed)
                .ok_or_else(|| ConfigError::InvalidStartingPrice(other.to_string())),
        }
    }
}

/// Everything a live session needs to start.
///
/// Construction takes the ticker (the only required field); every other
/// knob starts at its default and is adjusted through `with_` builders.
/// [`SessionConfig::validate`] runs before any loop starts and is the
/// only place configuration errors surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub ticker: String,
    pub starting_price: StartingPrice,
    pub num_paths: usize,
    /// Relative deviation beyond which a path is refuted, in (0, 1).
    pub tolerance: f64,
    pub forecast_horizon_minutes: usize,
    pub update_interval: Duration,
    pub history_days: i64,
    /// Fixed seed for reproducible sessions; entropy when absent.
    pub seed: Option<u64>,
    pub top_k_zones: usize,
    /// Deadline for each individual bar-source request.
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            starting_price: StartingPrice::default(),
            num_paths: 500,
            tolerance: 0.01,
            forecast_horizon_minutes: 10_080,
            update_interval: Duration::from_secs(60),
            history_days: 30,
            seed: None,
            top_k_zones: 5,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_starting_price(self, starting_price: StartingPrice) -> Self {
        Self {
            starting_price,
            ..self
        }
    }

    pub fn with_num_paths(self, num_paths: usize) -> Self {
        Self { num_paths, ..self }
    }

    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_forecast_horizon_minutes(self, forecast_horizon_minutes: usize) -> Self {
        Self {
            forecast_horizon_minutes,
            ..self
        }
    }

    pub fn with_update_interval(self, update_interval: Duration) -> Self {
        Self {
            update_interval,
            ..self
        }
    }

    pub fn with_history_days(self, history_days: i64) -> Self {
        Self {
            history_days,
            ..self
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn with_top_k_zones(self, top_k_zones: usize) -> Self {
        Self {
            top_k_zones,
            ..self
        }
    }

    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::EmptyTicker);
        }
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(ConfigError::ToleranceOutOfRange(self.tolerance));
        }
        if self.forecast_horizon_minutes < 1 {
            return Err(ConfigError::InvalidHorizon(self.forecast_horizon_minutes));
        }
        if self.num_paths < 1 {
            return Err(ConfigError::InvalidPathCount(self.num_paths));
        }
        if self.update_interval < Duration::from_secs(1) {
            return Err(ConfigError::InvalidUpdateInterval);
        }
        if self.history_days < 1 {
            return Err(ConfigError::InvalidHistoryDays(self.history_days));
        }
        if self.top_k_zones < 1 {
            return Err(ConfigError::InvalidZoneLimit);
        }
        if let StartingPrice::Fixed(price) = self.starting_price {
            if !(price.is_finite() && price > 0.0) {
                return Err(ConfigError::InvalidStartingPrice(price.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SessionConfig::new("QQQ").validate().is_ok());
    }

    #[test]
    fn starting_price_parses_all_three_forms() {
        assert_eq!(
            StartingPrice::from_str("weekly-open").unwrap(),
            StartingPrice::WeeklyOpen
        );
        assert_eq!(
            StartingPrice::from_str("daily-open").unwrap(),
            StartingPrice::DailyOpen
        );
        assert_eq!(
            StartingPrice::from_str("15000.5").unwrap(),
            StartingPrice::Fixed(15000.5)
        );
        assert!(StartingPrice::from_str("monthly-open").is_err());
        assert!(StartingPrice::from_str("-3.0").is_err());
        assert!(StartingPrice::from_str("NaN").is_err());
    }

    #[test]
    fn out_of_range_knobs_are_rejected() {
        assert!(matches!(
            SessionConfig::new("QQQ").with_tolerance(0.0).validate(),
            Err(ConfigError::ToleranceOutOfRange(_))
        ));
        assert!(matches!(
            SessionConfig::new("QQQ").with_tolerance(1.0).validate(),
            Err(ConfigError::ToleranceOutOfRange(_))
        ));
        assert!(matches!(
            SessionConfig::new("QQQ")
                .with_forecast_horizon_minutes(0)
                .validate(),
            Err(ConfigError::InvalidHorizon(0))
        ));
        assert!(matches!(
            SessionConfig::new("QQQ").with_num_paths(0).validate(),
            Err(ConfigError::InvalidPathCount(0))
        ));
        assert!(matches!(
            SessionConfig::new("QQQ")
                .with_update_interval(Duration::from_millis(200))
                .validate(),
            Err(ConfigError::InvalidUpdateInterval)
        ));
        assert!(matches!(
            SessionConfig::new("  ").validate(),
            Err(ConfigError::EmptyTicker)
        ));
        assert!(matches!(
            SessionConfig::new("QQQ")
                .with_starting_price(StartingPrice::Fixed(-1.0))
                .validate(),
            Err(ConfigError::InvalidStartingPrice(_))
        ));
    }
}
