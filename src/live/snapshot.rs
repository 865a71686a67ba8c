use chrono::NaiveDateTime;
use serde::Serialize;

use crate::sim::zones::Zone;

/// Atomic read-only view of one update cycle.
///
/// A snapshot reflects the state after exactly its own elimination call
/// and no later mutation. Downstream consumers (renderers, recorders)
/// receive it by value; nothing in it borrows the population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub update_count: u64,
    pub timestamp: NaiveDateTime,
    /// `None` on a no-data cycle (the bar source had nothing to offer).
    pub latest_price: Option<f64>,
    /// Paths eliminated in this cycle alone.
    pub paths_eliminated: usize,
    pub paths_active: usize,
    pub paths_total: usize,
    /// live / total, in [0, 1].
    pub survival_rate: f64,
    /// Up to the configured top-K zones, ranked by probability.
    pub reversal_zones: Vec<Zone>,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Final tally emitted when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub cycles: u64,
    pub last_price: Option<f64>,
    pub paths_active: usize,
    pub paths_total: usize,
    pub survival_rate: f64,
}
