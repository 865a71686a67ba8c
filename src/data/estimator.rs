//! Drift and volatility estimation from higher-timeframe returns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{
    domain::{Bar, Timeframe},
    source::BarSource,
    store::TimeframeStore,
};

/// Annualized GBM parameters derived from one timeframe's closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    /// Annualized mean simple return (drift).
    pub mu: f64,
    /// Annualized standard deviation of simple returns (volatility).
    pub sigma: f64,
}

/// Computes annualized (µ, σ) from per-period simple returns
/// `close_t / close_{t-1} - 1`.
///
/// Returns `None` for fewer than two bars. With exactly two bars the
/// single return gives σ = 0 (a sample standard deviation needs at least
/// two observations).
pub fn annualized_params(bars: &[Bar], timeframe: Timeframe) -> Option<GbmParams> {
    if bars.len() < 2 {
        return None;
    }

    let returns: Vec<f64> = bars
        .windows(2)
        .map(|pair| pair[1].close.0 / pair[0].close.0 - 1.0)
        .collect();

    let periods = timeframe.periods_per_year();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let stdev = if returns.len() < 2 {
        0.0
    } else {
        let variance = returns
            .iter()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / (returns.len() - 1) as f64;
        variance.sqrt()
    };

    Some(GbmParams {
        mu: mean * periods,
        sigma: stdev * periods.sqrt(),
    })
}

/// Estimates parameters for every higher timeframe with enough history.
///
/// The full mapping is returned so a consumer can override the default
/// selection; an empty mapping means no timeframe is usable and the
/// session cannot start.
pub fn estimate_higher_timeframes<B: BarSource>(
    store: &TimeframeStore<B>,
) -> BTreeMap<Timeframe, GbmParams> {
    Timeframe::HIGHER
        .iter()
        .filter_map(|tf| annualized_params(store.series(*tf), *tf).map(|params| (*tf, params)))
        .collect()
}

/// Picks the parameters to drive a simulation: daily if present,
/// otherwise the first available of 4h then 1h.
pub fn select_params(params: &BTreeMap<Timeframe, GbmParams>) -> Option<(Timeframe, GbmParams)> {
    Timeframe::HIGHER
        .iter()
        .find_map(|tf| params.get(tf).map(|p| (*tf, *p)))
}
