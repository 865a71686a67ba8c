//! Probability-weighted price zones derived from the live population.

use std::cmp::Reverse;

use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::sim::population::PathPopulation;

/// Role a price zone plays relative to the live population's mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Support,
    Resistance,
    Convergence,
}

/// A probability-weighted price interval. Derived view; lives only as
/// long as the snapshot that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub price_level: f64,
    pub price_low: f64,
    pub price_high: f64,
    /// Fraction of live paths inside the interval, in [0, 1].
    pub probability: f64,
    pub path_count: usize,
    #[serde(rename = "zone_type")]
    pub kind: ZoneKind,
}

/// A price level where live trajectories tend to change direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalZone {
    pub price_level: f64,
    /// Fraction of all observed reversals near this level.
    pub probability: f64,
    pub reversal_count: usize,
    #[serde(rename = "zone_type")]
    pub kind: ZoneKind,
}

/// Pure zone queries over a borrowed [`PathPopulation`].
///
/// Identical inputs always give identical output; the detector holds no
/// state beyond its thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneDetector {
    bins: usize,
    min_paths: usize,
    density_threshold: f64,
}

impl Default for ZoneDetector {
    fn default() -> Self {
        Self {
            bins: 50,
            min_paths: 10,
            density_threshold: 0.3,
        }
    }
}

impl ZoneDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bins(self, bins: usize) -> Self {
        Self { bins, ..self }
    }

    pub fn with_min_paths(self, min_paths: usize) -> Self {
        Self { min_paths, ..self }
    }

    /// Fraction of the tallest bin (or densest KDE peak) a cluster must
    /// reach to count as a zone. Clamped to [0, 1].
    pub fn with_density_threshold(self, density_threshold: f64) -> Self {
        Self {
            density_threshold: density_threshold.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Histogram clustering of live prices at `ts`.
    ///
    /// Bins whose count reaches both `min_paths` and
    /// `density_threshold · max_count` become zones, labeled by where
    /// their midpoint sits relative to the live mean and ranked by
    /// probability (ties broken toward the lower price).
    pub fn detect_zones(&self, population: &PathPopulation, ts: NaiveDateTime) -> Vec<Zone> {
        let prices = population.all_live_at(ts);
        if prices.len() < self.min_paths {
            return Vec::new();
        }

        let (low, high) = spanning_range(&prices);
        let width = (high - low) / self.bins as f64;
        let mut counts = vec![0usize; self.bins];
        for price in &prices {
            // The right edge of the final bin is inclusive.
            let bin = (((price - low) / width) as usize).min(self.bins - 1);
            counts[bin] += 1;
        }

        let max_count = counts.iter().copied().max().unwrap_or(0);
        let threshold = max_count as f64 * self.density_threshold;
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;

        let mut zones: Vec<Zone> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count >= self.min_paths && count as f64 >= threshold)
            .map(|(bin, &count)| {
                let price_low = low + bin as f64 * width;
                let price_high = price_low + width;
                let price_level = (price_low + price_high) / 2.0;
                Zone {
                    price_level,
                    price_low,
                    price_high,
                    probability: count as f64 / prices.len() as f64,
                    path_count: count,
                    kind: classify(price_level, mean),
                }
            })
            .collect();

        sort_zones(&mut zones);
        zones
    }

    /// Finds price levels where live paths reversed direction inside the
    /// trailing `lookback_minutes` window ending at `reference_ts`.
    ///
    /// Local extrema (strict three-point test) are collected across all
    /// live paths and clustered by Gaussian kernel density; peaks at or
    /// above `density_threshold` of the maximum density become zones,
    /// labeled by the majority extremum kind nearby. When the density
    /// estimate degenerates (zero spread, non-finite bandwidth) a 20-bin
    /// histogram clustering takes over with the same labeling rule.
    pub fn detect_reversal_points(
        &self,
        population: &PathPopulation,
        reference_ts: NaiveDateTime,
        lookback_minutes: usize,
    ) -> Vec<ReversalZone> {
        let end = population.grid().clamped_step(reference_ts);
        let start = end.saturating_sub(lookback_minutes);
        if end - start < 2 {
            return Vec::new();
        }

        let mut reversals: Vec<(f64, ZoneKind)> = Vec::new();
        for path_index in population.live_indices() {
            let path = population.path(path_index);
            let segment = path.slice(ndarray::s![start..=end]);
            for (left, mid, right) in segment.iter().tuple_windows() {
                if mid < left && mid < right {
                    reversals.push((*mid, ZoneKind::Support));
                } else if mid > left && mid > right {
                    reversals.push((*mid, ZoneKind::Resistance));
                }
            }
        }

        if reversals.is_empty() {
            return Vec::new();
        }

        self.kde_clusters(&reversals)
            .unwrap_or_else(|| self.histogram_clusters(&reversals))
    }

    /// Percentile-bucket convergence zones at `future_minutes` past
    /// `reference_ts` (clamped to the end of the grid).
    pub fn convergence_zones(
        &self,
        population: &PathPopulation,
        reference_ts: NaiveDateTime,
        future_minutes: usize,
        top_k: usize,
    ) -> Vec<Zone> {
        let target = reference_ts + Duration::minutes(future_minutes as i64);
        let mut prices = population.all_live_at(target);
        if prices.len() < self.min_paths {
            return Vec::new();
        }
        prices.sort_by(|a, b| a.total_cmp(b));

        const PERCENTILES: [f64; 5] = [10.0, 25.0, 50.0, 75.0, 90.0];
        let mut zones: Vec<Zone> = PERCENTILES
            .iter()
            .tuple_windows()
            .filter_map(|(&lo_q, &hi_q)| {
                let price_low = percentile(&prices, lo_q);
                let price_high = percentile(&prices, hi_q);
                let count = prices
                    .iter()
                    .filter(|&&p| p >= price_low && p <= price_high)
                    .count();
                (count > 0).then(|| Zone {
                    price_level: (price_low + price_high) / 2.0,
                    price_low,
                    price_high,
                    probability: count as f64 / prices.len() as f64,
                    path_count: count,
                    kind: ZoneKind::Convergence,
                })
            })
            .collect();

        sort_zones(&mut zones);
        zones.truncate(top_k);
        zones
    }

    /// Gaussian KDE clustering of reversal prices. `None` signals a
    /// degenerate estimate and asks for the histogram fallback.
    fn kde_clusters(&self, reversals: &[(f64, ZoneKind)]) -> Option<Vec<ReversalZone>> {
        let n = reversals.len();
        let prices: Vec<f64> = reversals.iter().map(|(price, _)| *price).collect();
        let (min, max) = match prices.iter().minmax().into_option() {
            Some((&min, &max)) => (min, max),
            None => return None,
        };
        if !(max > min) {
            return None;
        }

        // Scott's rule bandwidth over the sample.
        let mean = prices.iter().sum::<f64>() / n as f64;
        let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0).max(1.0);
        let bandwidth = variance.sqrt() * (n as f64).powf(-0.2);
        if !bandwidth.is_finite() || bandwidth <= 0.0 {
            return None;
        }

        const GRID_POINTS: usize = 100;
        let step = (max - min) / (GRID_POINTS - 1) as f64;
        let norm = 1.0 / (n as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
        let density: Vec<f64> = (0..GRID_POINTS)
            .map(|i| {
                let x = min + i as f64 * step;
                norm * prices
                    .iter()
                    .map(|p| (-0.5 * ((x - p) / bandwidth).powi(2)).exp())
                    .sum::<f64>()
            })
            .collect();

        let max_density = density.iter().copied().fold(0.0_f64, f64::max);
        if !max_density.is_finite() || max_density <= 0.0 {
            return None;
        }
        let height = max_density * self.density_threshold;

        let tolerance = (max - min) * 0.02;
        let mut zones = Vec::new();
        for i in 1..GRID_POINTS - 1 {
            let is_peak = density[i] > density[i - 1] && density[i] > density[i + 1];
            if !is_peak || density[i] < height {
                continue;
            }
            let level = min + i as f64 * step;
            let nearby: Vec<&(f64, ZoneKind)> = reversals
                .iter()
                .filter(|(price, _)| (price - level).abs() < tolerance)
                .collect();
            if nearby.len() < self.min_paths {
                continue;
            }
            zones.push(ReversalZone {
                price_level: level,
                probability: nearby.len() as f64 / n as f64,
                reversal_count: nearby.len(),
                kind: majority_kind(nearby.iter().map(|(_, kind)| *kind)),
            });
        }
        Some(zones)
    }

    /// 20-bin histogram fallback when the density estimate degenerates.
    fn histogram_clusters(&self, reversals: &[(f64, ZoneKind)]) -> Vec<ReversalZone> {
        const BINS: usize = 20;
        let prices: Vec<f64> = reversals.iter().map(|(price, _)| *price).collect();
        let (low, high) = spanning_range(&prices);
        let width = (high - low) / BINS as f64;

        let mut zones = Vec::new();
        for bin in 0..BINS {
            let bin_low = low + bin as f64 * width;
            let bin_high = bin_low + width;
            let members: Vec<&(f64, ZoneKind)> = reversals
                .iter()
                .filter(|(price, _)| {
                    *price >= bin_low && (*price < bin_high || (bin == BINS - 1 && *price <= bin_high))
                })
                .collect();
            if members.len() < self.min_paths {
                continue;
            }
            zones.push(ReversalZone {
                price_level: (bin_low + bin_high) / 2.0,
                probability: members.len() as f64 / reversals.len() as f64,
                reversal_count: members.len(),
                kind: majority_kind(members.iter().map(|(_, kind)| *kind)),
            });
        }
        zones
    }
}

/// Histogram range over `prices`, widened by ±0.5 when every price is
/// identical so a zero-width range still bins.
fn spanning_range(prices: &[f64]) -> (f64, f64) {
    let (min, max) = prices
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| {
            (lo.min(p), hi.max(p))
        });
    if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    }
}

/// Support below the live mean, resistance above, convergence at it.
/// Equality is relative-ε so histogram-edge rounding cannot flip a
/// convergence zone into support.
fn classify(price_level: f64, mean: f64) -> ZoneKind {
    let epsilon = mean.abs() * 1e-9 + 1e-12;
    if (price_level - mean).abs() <= epsilon {
        ZoneKind::Convergence
    } else if price_level < mean {
        ZoneKind::Support
    } else {
        ZoneKind::Resistance
    }
}

/// Descending probability; equal probabilities rank the lower price
/// first.
fn sort_zones(zones: &mut [Zone]) {
    zones.sort_by_key(|zone| {
        (
            Reverse(OrderedFloat(zone.probability)),
            OrderedFloat(zone.price_level),
        )
    });
}

fn majority_kind(kinds: impl Iterator<Item = ZoneKind>) -> ZoneKind {
    let mut support = 0usize;
    let mut resistance = 0usize;
    for kind in kinds {
        match kind {
            ZoneKind::Support => support += 1,
            _ => resistance += 1,
        }
    }
    if support > resistance {
        ZoneKind::Support
    } else {
        ZoneKind::Resistance
    }
}

/// Linear-interpolation percentile over an ascending slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    if below == above {
        sorted[below]
    } else {
        let weight = rank - below as f64;
        sorted[below] * (1.0 - weight) + sorted[above] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::TimeGrid;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn population_from_rows(rows: &[Vec<f64>]) -> PathPopulation {
        let steps = rows[0].len() - 1;
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((rows.len(), steps + 1), flat).unwrap();
        PathPopulation::new(matrix, TimeGrid::new(anchor(), steps))
    }

    /// 10 paths at 99, 200 at 100, 10 at 101, all flat.
    fn clustered_population() -> PathPopulation {
        let mut rows = Vec::new();
        rows.extend(std::iter::repeat_n(vec![99.0, 99.0], 10));
        rows.extend(std::iter::repeat_n(vec![100.0, 100.0], 200));
        rows.extend(std::iter::repeat_n(vec![101.0, 101.0], 10));
        population_from_rows(&rows)
    }

    #[test]
    fn dominant_bin_becomes_the_convergence_zone() {
        let population = clustered_population();
        let detector = ZoneDetector::new().with_bins(3);

        let zones = detector.detect_zones(&population, anchor());

        // 10-count side bins miss the 0.3 · 200 density cutoff.
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert!((zone.probability - 200.0 / 220.0).abs() < 1e-12);
        assert_eq!(zone.path_count, 200);
        assert_eq!(zone.kind, ZoneKind::Convergence, "the bin at the mean is convergence");
        assert!(zone.price_low <= zone.price_level && zone.price_level <= zone.price_high);
    }

    #[test]
    fn lowered_threshold_labels_all_three_clusters() {
        let population = clustered_population();
        let detector = ZoneDetector::new().with_bins(3).with_density_threshold(0.05);

        let zones = detector.detect_zones(&population, anchor());

        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].kind, ZoneKind::Convergence);
        assert!((zones[0].probability - 200.0 / 220.0).abs() < 1e-12);

        // The side zones share 10/220; the tie ranks the lower price
        // first.
        assert!((zones[1].probability - 10.0 / 220.0).abs() < 1e-12);
        assert!((zones[2].probability - 10.0 / 220.0).abs() < 1e-12);
        assert!(zones[1].price_level < zones[2].price_level);
        assert_eq!(zones[1].kind, ZoneKind::Support);
        assert_eq!(zones[2].kind, ZoneKind::Resistance);

        let total: f64 = zones.iter().map(|z| z.probability).sum();
        assert!(total <= 1.0 + 1e-12, "disjoint bins can never exceed 1");
    }

    #[test]
    fn too_few_live_paths_yield_no_zones() {
        let population = population_from_rows(&vec![vec![100.0, 100.0]; 5]);
        let zones = ZoneDetector::new().detect_zones(&population, anchor());
        assert!(zones.is_empty());
    }

    #[test]
    fn detection_is_pure() {
        let population = clustered_population();
        let detector = ZoneDetector::new().with_bins(3).with_density_threshold(0.05);

        let first = detector.detect_zones(&population, anchor());
        let second = detector.detect_zones(&population, anchor());
        assert_eq!(first, second, "an unchanged population gives identical zones");
    }

    #[test]
    fn probabilities_stay_within_bounds() {
        let population = clustered_population();
        let zones = ZoneDetector::new()
            .with_bins(3)
            .with_density_threshold(0.0)
            .detect_zones(&population, anchor());

        for zone in &zones {
            assert!(zone.probability > 0.0 && zone.probability <= 1.0);
            assert!(zone.path_count >= 1);
            assert!(zone.price_low <= zone.price_level && zone.price_level <= zone.price_high);
        }
    }

    #[test]
    fn reversal_clusters_label_by_majority() {
        // 24 paths dip to 95, 12 paths spike to 100, one path dips to 90
        // to stretch the price range so the 95 mode sits inside it.
        let mut rows = Vec::new();
        rows.extend(std::iter::repeat_n(vec![100.0, 95.0, 100.0], 24));
        rows.extend(std::iter::repeat_n(vec![95.0, 100.0, 95.0], 12));
        rows.push(vec![100.0, 90.0, 100.0]);
        let population = population_from_rows(&rows);

        let zones = ZoneDetector::new().detect_reversal_points(
            &population,
            population.grid().end(),
            2,
        );

        assert_eq!(zones.len(), 1, "only the interior density mode qualifies");
        let zone = &zones[0];
        assert!(
            (zone.price_level - 95.0).abs() < 0.3,
            "peak should sit near the 95 cluster, got {}",
            zone.price_level
        );
        assert_eq!(zone.kind, ZoneKind::Support);
        assert_eq!(zone.reversal_count, 24);
        assert!((zone.probability - 24.0 / 37.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_reversal_prices_fall_back_to_histogram() {
        // Every extremum at exactly 95: zero spread defeats the KDE.
        let rows = vec![vec![100.0, 95.0, 100.0]; 12];
        let population = population_from_rows(&rows);

        let zones = ZoneDetector::new().detect_reversal_points(
            &population,
            population.grid().end(),
            2,
        );

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].reversal_count, 12);
        assert_eq!(zones[0].kind, ZoneKind::Support);
        assert_eq!(zones[0].probability, 1.0);
        assert!((zones[0].price_level - 95.0).abs() < 0.5);
    }

    #[test]
    fn monotone_paths_have_no_reversals() {
        let rows = vec![vec![100.0, 101.0, 102.0, 103.0]; 12];
        let population = population_from_rows(&rows);

        let zones = ZoneDetector::new().detect_reversal_points(
            &population,
            population.grid().end(),
            3,
        );
        assert!(zones.is_empty());
    }

    #[test]
    fn convergence_zones_bucket_by_percentile() {
        // 40 flat paths at 101..=140.
        let rows: Vec<Vec<f64>> = (1..=40)
            .map(|i| vec![100.0 + i as f64, 100.0 + i as f64])
            .collect();
        let population = population_from_rows(&rows);

        let zones = ZoneDetector::new().convergence_zones(&population, anchor(), 240, 5);

        assert_eq!(zones.len(), 4);
        for zone in &zones {
            assert_eq!(zone.kind, ZoneKind::Convergence);
            assert!(zone.path_count >= 1);
            assert!(zone.price_low <= zone.price_level && zone.price_level <= zone.price_high);
            assert!(zone.probability <= 1.0);
        }
        assert!(
            zones.windows(2).all(|w| w[0].probability >= w[1].probability),
            "zones are ranked by probability"
        );

        let top2 = ZoneDetector::new().convergence_zones(&population, anchor(), 240, 2);
        assert_eq!(top2.len(), 2);
    }

    #[test]
    fn convergence_needs_a_minimum_population() {
        let rows = vec![vec![100.0, 100.0]; 5];
        let population = population_from_rows(&rows);
        assert!(
            ZoneDetector::new()
                .convergence_zones(&population, anchor(), 60, 5)
                .is_empty()
        );
    }
}
