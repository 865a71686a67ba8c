use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView1};

use crate::{
    error::{DriftwatchResult, SimulationError},
    sim::TimeGrid,
};

/// Summary of the live population's price distribution at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationBounds {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub stdev: f64,
}

/// Liveness counters for a population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStats {
    pub total: usize,
    pub live: usize,
    pub dead: usize,
    /// live / total over the population's lifetime.
    pub survival_rate: f64,
}

/// Owns the N×(H+1) price matrix, its time grid and the liveness of
/// every trajectory.
///
/// The matrix is immutable after construction; only liveness changes,
/// and it changes in one direction: the live set shrinks monotonically
/// and an eliminated path never returns.
#[derive(Debug, Clone)]
pub struct PathPopulation {
    matrix: Array2<f64>,
    grid: TimeGrid,
    alive: Vec<bool>,
    live_count: usize,
    eliminated_at: Vec<Option<NaiveDateTime>>,
}

impl PathPopulation {
    /// Wraps a generated matrix. Row count is the path count; column
    /// count must equal the grid length.
    pub fn new(matrix: Array2<f64>, grid: TimeGrid) -> Self {
        debug_assert_eq!(matrix.ncols(), grid.len(), "matrix columns must match the grid");
        let num_paths = matrix.nrows();
        Self {
            matrix,
            grid,
            alive: vec![true; num_paths],
            live_count: num_paths,
            eliminated_at: vec![None; num_paths],
        }
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn num_paths(&self) -> usize {
        self.matrix.nrows()
    }

    /// Read-only view of one trajectory.
    pub fn path(&self, path_index: usize) -> ArrayView1<'_, f64> {
        self.matrix.row(path_index)
    }

    pub fn is_live(&self, path_index: usize) -> bool {
        self.alive.get(path_index).copied().unwrap_or(false)
    }

    /// The instant a path was first ruled out, if it has been.
    pub fn eliminated_at(&self, path_index: usize) -> Option<NaiveDateTime> {
        self.eliminated_at.get(path_index).copied().flatten()
    }

    /// Indices of paths not yet refuted, ascending.
    pub fn live_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter_map(|(index, &alive)| alive.then_some(index))
    }

    /// The price of path `path_index` at the grid point nearest `ts`.
    ///
    /// Returns `Ok(None)` when `ts` lies outside the grid by more than
    /// one step; an out-of-range index is a caller bug and errors.
    pub fn value_at(&self, path_index: usize, ts: NaiveDateTime) -> DriftwatchResult<Option<f64>> {
        if path_index >= self.num_paths() {
            return Err(SimulationError::PathIndexOutOfBounds {
                index: path_index,
                count: self.num_paths(),
            }
            .into());
        }
        Ok(self
            .grid
            .nearest_step(ts)
            .map(|step| self.matrix[[path_index, step]]))
    }

    /// Prices of all live paths at the grid point nearest `ts` (clamped
    /// into the grid), in ascending path order.
    pub fn all_live_at(&self, ts: NaiveDateTime) -> Vec<f64> {
        let step = self.grid.clamped_step(ts);
        self.live_indices()
            .map(|index| self.matrix[[index, step]])
            .collect()
    }

    /// Distribution summary of the live population at `ts`, or `None`
    /// when nothing is live.
    pub fn bounds_at(&self, ts: NaiveDateTime) -> Option<PopulationBounds> {
        let mut prices = self.all_live_at(ts);
        if prices.is_empty() {
            return None;
        }

        prices.sort_by(|a, b| a.total_cmp(b));
        let n = prices.len();
        let mean = prices.iter().sum::<f64>() / n as f64;
        let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            prices[n / 2]
        } else {
            (prices[n / 2 - 1] + prices[n / 2]) / 2.0
        };

        Some(PopulationBounds {
            min: prices[0],
            max: prices[n - 1],
            mean,
            median,
            stdev: variance.sqrt(),
        })
    }

    /// Removes every live path whose price at `ts` deviates from
    /// `observed` by more than `tolerance` (relative), recording the
    /// elimination instant. Returns how many were removed.
    ///
    /// The removed set depends only on the matrix, `ts`, `observed` and
    /// `tolerance` — never on iteration order — so repeating the same
    /// call removes nothing the second time. Instants past the end of
    /// the grid degrade to the final step.
    pub fn eliminate(
        &mut self,
        observed: f64,
        ts: NaiveDateTime,
        tolerance: f64,
    ) -> DriftwatchResult<usize> {
        if observed <= 0.0 {
            return Err(SimulationError::InvalidObservedPrice(observed).into());
        }

        let step = self.grid.clamped_step(ts);
        let mut removed = 0;
        for index in 0..self.num_paths() {
            if !self.alive[index] {
                continue;
            }
            let price = self.matrix[[index, step]];
            let deviation = (price - observed).abs() / observed;
            if deviation > tolerance {
                self.alive[index] = false;
                self.eliminated_at[index] = Some(ts);
                self.live_count -= 1;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn statistics(&self) -> PopulationStats {
        let total = self.num_paths();
        let live = self.live_count;
        PopulationStats {
            total,
            live,
            dead: total - live,
            survival_rate: if total == 0 {
                0.0
            } else {
                live as f64 / total as f64
            },
        }
    }
}
