// === Public Modules (The Canonical Paths) ===
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod live;
pub mod sim;

// === Convenience Facades ===
pub use crate::config::{SessionConfig, StartingPrice};
pub use crate::data::{
    domain::{Bar, Price, Timeframe, Volume},
    estimator::GbmParams,
    source::BarSource,
    store::TimeframeStore,
};
pub use crate::error::{DriftwatchError, DriftwatchResult};
pub use crate::live::{
    snapshot::{SessionSummary, Snapshot},
    updater::{LiveUpdater, UpdateObserver},
};
pub use crate::sim::{
    TimeGrid,
    generator::{MuScaling, PathGenerator},
    population::{PathPopulation, PopulationBounds, PopulationStats},
    zones::{ReversalZone, Zone, ZoneDetector, ZoneKind},
};
