use chrono::{Duration, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    calendar,
    config::{SessionConfig, StartingPrice},
    data::{domain::Timeframe, estimator, source::BarSource, store::TimeframeStore},
    error::{DataError, DriftwatchError, DriftwatchResult},
    live::snapshot::{SessionSummary, Snapshot},
    sim::{
        generator::PathGenerator,
        population::PathPopulation,
        zones::{Zone, ZoneDetector},
    },
};

/// Per-cycle callback handed each finished [`Snapshot`].
///
/// Observer failures are absorbed and logged; they can never halt the
/// update loop.
pub type UpdateObserver =
    Box<dyn FnMut(&Snapshot) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send>;

/// Drives a live session: owns the [`TimeframeStore`] and
/// [`PathPopulation`] for its whole lifetime and runs the periodic
/// poll → eliminate → re-derive → emit cycle.
///
/// At most one cycle is in flight at a time and snapshots are emitted in
/// strict cycle order. Stopping is cooperative: cancel the token from
/// [`LiveUpdater::cancellation_token`] and the current cycle finishes,
/// the sleep is interrupted, and [`LiveUpdater::run`] returns the final
/// summary.
pub struct LiveUpdater<B> {
    store: TimeframeStore<B>,
    population: PathPopulation,
    detector: ZoneDetector,
    config: SessionConfig,
    cancel: CancellationToken,
    observer: Option<UpdateObserver>,
    update_count: u64,
    last_price: Option<f64>,
    weekly_open_price: Option<f64>,
    daily_open_price: Option<f64>,
}

impl<B: std::fmt::Debug> std::fmt::Debug for LiveUpdater<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveUpdater")
            .field("store", &self.store)
            .field("population", &self.population)
            .field("detector", &self.detector)
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .field("observer", &self.observer.as_ref().map(|_| "<fn>"))
            .field("update_count", &self.update_count)
            .field("last_price", &self.last_price)
            .field("weekly_open_price", &self.weekly_open_price)
            .field("daily_open_price", &self.daily_open_price)
            .finish()
    }
}

impl<B: BarSource> LiveUpdater<B> {
    /// Bootstraps a session against the current Eastern wall-clock time.
    pub async fn initialize(source: B, config: SessionConfig) -> DriftwatchResult<Self> {
        Self::initialize_at(source, config, calendar::now_eastern()).await
    }

    /// Bootstraps a session against an explicit reference instant:
    /// fetches history, resolves the anchor, estimates (µ, σ) and
    /// generates the path population.
    pub async fn initialize_at(
        source: B,
        config: SessionConfig,
        now: NaiveDateTime,
    ) -> DriftwatchResult<Self> {
        config.validate()?;

        let mut store = TimeframeStore::new(source, config.ticker.clone(), config.request_timeout);
        store
            .fetch_historical(now - Duration::days(config.history_days), now)
            .await;

        let (anchor_price, anchor_ts) = resolve_anchor(&store, &config, now)?;

        let estimated = estimator::estimate_higher_timeframes(&store);
        let (params_timeframe, params) =
            estimator::select_params(&estimated).ok_or(DataError::NoUsableHistory)?;

        let mut generator = PathGenerator::new(anchor_price, params)
            .with_horizon_minutes(config.forecast_horizon_minutes)
            .with_num_paths(config.num_paths);
        if let Some(seed) = config.seed {
            generator = generator.with_seed(seed);
        }

        info!(
            ticker = %config.ticker,
            anchor_price,
            anchor = %anchor_ts,
            params_timeframe = %params_timeframe,
            mu = params.mu,
            sigma = params.sigma,
            num_paths = config.num_paths,
            horizon_minutes = config.forecast_horizon_minutes,
            seed = generator.seed(),
            "session initialized"
        );

        let population = generator.generate(anchor_ts);

        let weekly_open_price = store
            .close_nearest(Timeframe::D1, calendar::weekly_open(now))
            .map(|price| price.0);
        let daily_open_price = store
            .close_nearest(Timeframe::M1, calendar::daily_open(now))
            .map(|price| price.0);

        Ok(Self {
            store,
            population,
            detector: ZoneDetector::new(),
            config,
            cancel: CancellationToken::new(),
            observer: None,
            update_count: 0,
            last_price: None,
            weekly_open_price,
            daily_open_price,
        })
    }

    /// Token that stops the loop when cancelled. Clone it before
    /// calling [`LiveUpdater::run`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_observer(&mut self, observer: UpdateObserver) {
        self.observer = Some(observer);
    }

    pub fn population(&self) -> &PathPopulation {
        &self.population
    }

    pub fn store(&self) -> &TimeframeStore<B> {
        &self.store
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Runs cycles until the cancellation token fires, then returns the
    /// final tally.
    ///
    /// Transient failures inside a cycle are logged and the loop keeps
    /// going; only internal invariant violations propagate.
    pub async fn run(&mut self) -> DriftwatchResult<SessionSummary> {
        info!(
            interval_s = self.config.update_interval.as_secs(),
            "live updater started"
        );

        while !self.cancel.is_cancelled() {
            match self.run_single_cycle(calendar::now_eastern()).await {
                Ok(_) => {}
                Err(err @ DriftwatchError::Simulation(_)) => return Err(err),
                Err(err) => error!(error = %err, "update cycle failed, continuing"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.update_interval) => {}
            }
        }

        let summary = self.summary();
        info!(
            cycles = summary.cycles,
            paths_active = summary.paths_active,
            paths_total = summary.paths_total,
            survival_rate = summary.survival_rate,
            "live updater stopped"
        );
        Ok(summary)
    }

    /// One full cycle against an explicit `now`. Public so consumers can
    /// step a session manually instead of running the loop.
    pub async fn run_single_cycle(&mut self, now: NaiveDateTime) -> DriftwatchResult<Snapshot> {
        self.update_count += 1;
        self.store.update_latest().await;

        let Some(latest) = self.store.latest_close(Timeframe::M1) else {
            warn!(update = self.update_count, "no price data available");
            let snapshot = self.assemble(now, None, 0, Vec::new());
            self.notify(&snapshot);
            return Ok(snapshot);
        };

        let eliminated = self
            .population
            .eliminate(latest.0, now, self.config.tolerance)?;
        let zones: Vec<Zone> = self
            .detector
            .detect_zones(&self.population, now)
            .into_iter()
            .take(self.config.top_k_zones)
            .collect();

        self.last_price = Some(latest.0);
        let snapshot = self.assemble(now, Some(latest.0), eliminated, zones);
        self.log_cycle(&snapshot, latest.0);
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// The tally [`LiveUpdater::run`] returns; also available on demand.
    pub fn summary(&self) -> SessionSummary {
        let stats = self.population.statistics();
        SessionSummary {
            cycles: self.update_count,
            last_price: self.last_price,
            paths_active: stats.live,
            paths_total: stats.total,
            survival_rate: stats.survival_rate,
        }
    }

    fn assemble(
        &self,
        now: NaiveDateTime,
        latest_price: Option<f64>,
        paths_eliminated: usize,
        reversal_zones: Vec<Zone>,
    ) -> Snapshot {
        let stats = self.population.statistics();
        Snapshot {
            update_count: self.update_count,
            timestamp: now,
            latest_price,
            paths_eliminated,
            paths_active: stats.live,
            paths_total: stats.total,
            survival_rate: stats.survival_rate,
            reversal_zones,
        }
    }

    fn log_cycle(&self, snapshot: &Snapshot, price: f64) {
        let zones = snapshot
            .reversal_zones
            .iter()
            .map(|zone| {
                format!(
                    "{} @ {:.2} ({:.1}%)",
                    zone.kind,
                    zone.price_level,
                    zone.probability * 100.0
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        info!(
            update = snapshot.update_count,
            price,
            active = snapshot.paths_active,
            total = snapshot.paths_total,
            eliminated = snapshot.paths_eliminated,
            survival_rate = snapshot.survival_rate,
            weekly_open = ?self.weekly_open_price,
            daily_open = ?self.daily_open_price,
            zones = %zones,
            "update"
        );
    }

    fn notify(&mut self, snapshot: &Snapshot) {
        if let Some(observer) = self.observer.as_mut() {
            if let Err(err) = observer(snapshot) {
                warn!(error = %err, "snapshot observer failed");
            }
        }
    }
}

/// Resolves the (price, instant) pair all trajectories originate from.
fn resolve_anchor<B: BarSource>(
    store: &TimeframeStore<B>,
    config: &SessionConfig,
    now: NaiveDateTime,
) -> DriftwatchResult<(f64, NaiveDateTime)> {
    let unresolved =
        || DriftwatchError::from(DataError::AnchorUnresolved(store.symbol().to_string()));

    match config.starting_price {
        StartingPrice::WeeklyOpen => {
            let anchor_ts = calendar::weekly_open(now);
            let price = store
                .close_nearest(Timeframe::D1, anchor_ts)
                .or_else(|| store.latest_close(Timeframe::D1))
                .or_else(|| store.latest_close(Timeframe::M1))
                .ok_or_else(unresolved)?;
            Ok((price.0, anchor_ts))
        }
        StartingPrice::DailyOpen => {
            let anchor_ts = calendar::daily_open(now);
            let price = store
                .close_nearest(Timeframe::M1, anchor_ts)
                .or_else(|| store.latest_close(Timeframe::M1))
                .ok_or_else(unresolved)?;
            Ok((price.0, anchor_ts))
        }
        StartingPrice::Fixed(price) => Ok((price, now)),
    }
}
