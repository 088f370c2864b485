//! Performance History Tracker
//!
//! Bounded history of outcome samples, each paired with the threshold that was in
//! force when it was produced. Feeds the historical term of the threshold
//! controller: how far recent outcomes sit from their targets, and whether raising
//! the threshold has tended to help or hurt.

use serde::{Deserialize, Serialize};

use crate::history::BoundedHistory;
use crate::PerformanceSample;

/// One feedback sample and the threshold it was measured under.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub sample: PerformanceSample,
    pub threshold_used: f32,
}

/// Mean outcome metrics over a window of records.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricMeans {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

#[derive(Debug)]
pub struct PerformanceHistoryTracker {
    records: BoundedHistory<PerformanceRecord>,
}

impl PerformanceHistoryTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: BoundedHistory::new(capacity),
        }
    }

    pub fn record(&mut self, sample: PerformanceSample, threshold_used: f32) {
        self.records.push(PerformanceRecord {
            sample,
            threshold_used,
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Oldest to newest.
    pub fn records(&self) -> impl Iterator<Item = &PerformanceRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Means over the last `window` records. `None` when empty.
    pub fn recent_means(&self, window: usize) -> Option<MetricMeans> {
        let mut n = 0usize;
        let mut sum = [0.0f32; 4];
        for r in self.records.recent(window) {
            let s = &r.sample;
            for (acc, v) in sum.iter_mut().zip([s.accuracy, s.precision, s.recall, s.f1]) {
                *acc += v;
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let inv = 1.0 / n as f32;
        Some(MetricMeans {
            accuracy: sum[0] * inv,
            precision: sum[1] * inv,
            recall: sum[2] * inv,
            f1: sum[3] * inv,
        })
    }

    /// Mean Pearson correlation of threshold-used against accuracy, precision and
    /// recall over the last `window` records. 0.0 when undefined.
    pub fn threshold_correlation(&self, window: usize) -> f32 {
        let recent: Vec<&PerformanceRecord> = self.records.recent(window).collect();
        let thresholds: Vec<f32> = recent.iter().map(|r| r.threshold_used).collect();
        let metric = |f: fn(&PerformanceSample) -> f32| -> Vec<f32> {
            recent.iter().map(|r| f(&r.sample)).collect()
        };
        let correlations = [
            pearson(&thresholds, &metric(|s| s.accuracy)),
            pearson(&thresholds, &metric(|s| s.precision)),
            pearson(&thresholds, &metric(|s| s.recall)),
        ];
        correlations.iter().sum::<f32>() / correlations.len() as f32
    }
}

/// Pearson correlation coefficient. Returns 0.0 for fewer than two points, a
/// zero-variance side, or any non-finite result.
pub fn pearson(xs: &[f32], ys: &[f32]) -> f32 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let mean_y = ys.iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    let mut cov = 0.0f64;
    let mut var_x = 0.0f64;
    let mut var_y = 0.0f64;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let dx = x as f64 - mean_x;
        let dy = y as f64 - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    const VARIANCE_EPS: f64 = 1e-12;
    if var_x < VARIANCE_EPS || var_y < VARIANCE_EPS {
        return 0.0;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    if r.is_finite() {
        r.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pearson_basics() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-6);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pearson_degenerate_is_zero() {
        assert_eq!(pearson(&[0.5; 8], &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]), 0.0);
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
        assert_eq!(pearson(&[], &[]), 0.0);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut t = PerformanceHistoryTracker::new(3);
        for i in 0..5 {
            t.record(PerformanceSample::from_prf(0.1 * i as f32, 0.5, 0.5), 0.6);
        }
        assert_eq!(t.len(), 3);
        let first = t.records().next().map(|r| r.sample.accuracy);
        assert!((first.unwrap_or_default() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_recent_means_window() {
        let mut t = PerformanceHistoryTracker::new(10);
        assert!(t.recent_means(5).is_none());
        t.record(PerformanceSample::from_prf(0.2, 0.2, 0.2), 0.5);
        t.record(PerformanceSample::from_prf(0.8, 0.8, 0.8), 0.5);
        t.record(PerformanceSample::from_prf(0.6, 0.6, 0.6), 0.5);
        let m = t.recent_means(2).unwrap();
        assert!((m.accuracy - 0.7).abs() < 1e-6);
        assert!((m.f1 - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_correlation() {
        let mut t = PerformanceHistoryTracker::new(20);
        for i in 0..10 {
            let th = 0.4 + 0.02 * i as f32;
            t.record(PerformanceSample::from_prf(th, th, th), th);
        }
        assert!((t.threshold_correlation(20) - 1.0).abs() < 1e-5);

        t.clear();
        for i in 0..10 {
            t.record(PerformanceSample::from_prf(0.5, 0.5, 0.5), 0.4 + 0.02 * i as f32);
        }
        assert_eq!(t.threshold_correlation(20), 0.0);
    }
}
