//! # Windowed Histogram
//!
//! Distribution tracking over a sliding time window with a hard sample
//! cap. Both bounds hold simultaneously, so memory per histogram is
//! independent of total run time.
//!
//! Percentiles are estimated by linear interpolation over the sorted
//! window - exact for small windows, cheap enough to compute on demand.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A single recorded observation.
#[derive(Clone, Copy, Debug)]
struct Sample {
    at: Instant,
    value: f64,
}

/// Time-windowed histogram with bounded sample retention.
#[derive(Debug)]
pub struct Histogram {
    samples: VecDeque<Sample>,
    max_samples: usize,
    horizon: Duration,
}

/// Summary statistics computed from the current window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramSummary {
    /// Number of samples in the window.
    pub count: usize,
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// 50th percentile (median).
    pub p50: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl Histogram {
    /// Creates a histogram retaining at most `max_samples` observations
    /// no older than `horizon`.
    #[must_use]
    pub fn new(max_samples: usize, horizon: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples.min(1024)),
            max_samples,
            horizon,
        }
    }

    /// Records an observation, evicting anything outside the window.
    pub fn record(&mut self, value: f64) {
        let now = Instant::now();
        self.samples.push_back(Sample { at: now, value });

        if self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > self.horizon {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns the number of samples currently in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Computes summary statistics over the current window.
    ///
    /// Returns `None` when the window is empty.
    #[must_use]
    pub fn summary(&self) -> Option<HistogramSummary> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = self.samples.iter().map(|s| s.value).collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let mean = sum / count as f64;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(HistogramSummary {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            stddev: variance.sqrt(),
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

/// Linear-interpolation percentile over a sorted slice.
///
/// `sorted` must be non-empty and ascending.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}
