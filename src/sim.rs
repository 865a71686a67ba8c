pub mod generator;
pub mod population;
pub mod zones;

use chrono::{Duration, NaiveDateTime};

/// Uniform one-minute wall-clock time grid shared by every path of a
/// population.
///
/// The grid has `steps + 1` points; point 0 is the anchor instant.
/// Because spacing is uniform, timestamp-to-step lookup is integer
/// division on the minute offset rather than a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    anchor: NaiveDateTime,
    len: usize,
}

impl TimeGrid {
    pub fn new(anchor: NaiveDateTime, steps: usize) -> Self {
        Self {
            anchor,
            len: steps + 1,
        }
    }

    pub fn anchor(&self) -> NaiveDateTime {
        self.anchor
    }

    /// Number of grid points (steps + 1).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The instant of grid point `step`.
    pub fn at(&self, step: usize) -> NaiveDateTime {
        self.anchor + Duration::minutes(step as i64)
    }

    /// The final grid point.
    pub fn end(&self) -> NaiveDateTime {
        self.at(self.len - 1)
    }

    /// The grid point nearest to `ts`, or `None` when `ts` lies outside
    /// the grid by more than one step.
    pub fn nearest_step(&self, ts: NaiveDateTime) -> Option<usize> {
        let step = self.rounded_offset(ts);
        if step < -1 || step > self.len as i64 {
            return None;
        }
        Some(step.clamp(0, self.len as i64 - 1) as usize)
    }

    /// The grid point nearest to `ts`, clamped into the grid. Instants
    /// past the end degrade to the final step; instants before the
    /// anchor degrade to step 0.
    pub fn clamped_step(&self, ts: NaiveDateTime) -> usize {
        self.rounded_offset(ts).clamp(0, self.len as i64 - 1) as usize
    }

    fn rounded_offset(&self, ts: NaiveDateTime) -> i64 {
        let seconds = (ts - self.anchor).num_seconds();
        // Round to the nearest minute, away from zero on the half.
        if seconds >= 0 {
            (seconds + 30) / 60
        } else {
            (seconds - 30) / 60
        }
    }
}
