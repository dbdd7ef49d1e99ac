// src/stats.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Latency and throughput reduction over repeated trials
//!
//! All arithmetic is integer until the square root: the mean is a truncating
//! division, and the population variance divides the integer sum of squared
//! deviations from that truncated mean by N before `sqrt`. Historical result
//! files were produced this way, so a float-mean estimator would not compare.

use crate::constants::BYTES_PER_MB;
use crate::error::{Error, Result};

/// One timed phase, in nanoseconds
pub type DurationSample = i64;

/// Reduced statistics for one (configuration, phase) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: i64,
    pub max: i64,
    pub mean: i64,
    /// Population standard deviation (divisor N)
    pub stddev: i64,
    /// MiB per second derived from `mean`
    pub throughput_mb_per_s: f64,
    /// Number of samples reduced
    pub samples: usize,
}

impl Stats {
    /// Reduce `samples` for an operation that moved `bytes` bytes
    pub fn from_samples(samples: &[DurationSample], bytes: u64) -> Result<Self> {
        let first = *samples.first().ok_or(Error::EmptySampleSet)?;
        let n = samples.len() as i64;

        let mut min = first;
        let mut max = first;
        let mut sum: i128 = 0;
        for &s in samples {
            min = min.min(s);
            max = max.max(s);
            sum += s as i128;
        }
        let mean = (sum / n as i128) as i64;

        let variance_sum: i128 = samples
            .iter()
            .map(|&s| {
                let diff = (s - mean) as i128;
                diff * diff
            })
            .sum();
        let stddev = ((variance_sum / n as i128) as f64).sqrt() as i64;

        let stats = Self {
            min,
            max,
            mean,
            stddev,
            throughput_mb_per_s: throughput_mb_per_s(bytes, mean),
            samples: samples.len(),
        };

        tracing::trace!(
            "reduced {} samples: min={} max={} mean={} stddev={}",
            stats.samples,
            stats.min,
            stats.max,
            stats.mean,
            stats.stddev
        );

        Ok(stats)
    }

    pub fn mean_us(&self) -> f64 {
        self.mean as f64 / 1000.0
    }

    pub fn min_us(&self) -> f64 {
        self.min as f64 / 1000.0
    }

    pub fn max_us(&self) -> f64 {
        self.max as f64 / 1000.0
    }

    pub fn stddev_us(&self) -> f64 {
        self.stddev as f64 / 1000.0
    }
}

/// `(bytes / MiB) / (mean_ns / 1e9)`; a zero mean gives infinity
pub fn throughput_mb_per_s(bytes: u64, mean_ns: i64) -> f64 {
    let megabytes = bytes as f64 / BYTES_PER_MB;
    let seconds = mean_ns as f64 / 1e9;
    megabytes / seconds
}

/// Share of the mean round trip spent in each phase, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseBreakdown {
    pub write_pct: f64,
    pub launch_pct: f64,
    pub read_pct: f64,
}

impl PhaseBreakdown {
    pub fn new(write: &Stats, launch: &Stats, read: &Stats, total: &Stats) -> Self {
        let share = |phase: &Stats| {
            if total.mean > 0 {
                100.0 * phase.mean as f64 / total.mean as f64
            } else {
                0.0
            }
        };
        Self {
            write_pct: share(write),
            launch_pct: share(launch),
            read_pct: share(read),
        }
    }
}
