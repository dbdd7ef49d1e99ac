// src/report.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result persistence and the end-of-sweep summary
//!
//! The CSV layout is one header row plus one row per configuration:
//! configuration columns, then mean/min/max/stddev in microseconds and
//! throughput in MB/s for the write phase, then the same for the read phase.
//! All floating columns carry two decimals.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::runner::{BenchmarkResult, SweepOutcome};
use crate::stats::Stats;

pub const CSV_HEADER: &str = "device_count,worker_count,buffer_size,mode,\
write_mean_us,write_min_us,write_max_us,write_std_us,write_throughput_mbps,\
read_mean_us,read_min_us,read_max_us,read_std_us,read_throughput_mbps";

/// Destination for a finished result collection
pub trait ResultSink {
    fn persist(&mut self, results: &[BenchmarkResult]) -> Result<()>;
}

/// Writes the collection as a CSV file, replacing any previous contents
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvSink {
    fn persist(&mut self, results: &[BenchmarkResult]) -> Result<()> {
        fs::write(&self.path, render_csv(results))?;
        tracing::info!(
            "Wrote {} results to {}",
            results.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Keeps results in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub results: Vec<BenchmarkResult>,
}

impl ResultSink for MemorySink {
    fn persist(&mut self, results: &[BenchmarkResult]) -> Result<()> {
        self.results.extend_from_slice(results);
        Ok(())
    }
}

fn stats_columns(out: &mut String, stats: &Stats) {
    let _ = write!(
        out,
        ",{:.2},{:.2},{:.2},{:.2},{:.2}",
        stats.mean_us(),
        stats.min_us(),
        stats.max_us(),
        stats.stddev_us(),
        stats.throughput_mb_per_s
    );
}

/// Render results as CSV, in the order given
pub fn render_csv(results: &[BenchmarkResult]) -> String {
    let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + results.len() * 128);
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    for result in results {
        let config = &result.configuration;
        let _ = write!(
            csv,
            "{},{},{},{}",
            config.device_count, config.worker_count, config.buffer_size, config.mode
        );
        stats_columns(&mut csv, &result.write_stats);
        stats_columns(&mut csv, &result.read_stats);
        csv.push('\n');
    }

    csv
}

/// Human-readable table of a sweep, with failures and any phase breakdowns
pub fn render_summary(outcome: &SweepOutcome) -> String {
    let mut out = String::new();
    let rule = "=".repeat(96);

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "TRANSFER BENCHMARK SUMMARY");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(
        out,
        "{:>7} {:>7} {:>7} {:>8} {:>9} | {:>10} {:>10} {:>10} | {:>10} {:>10} {:>10}",
        "devices",
        "workers",
        "bytes",
        "mode",
        "backend",
        "write(us)",
        "std(us)",
        "MB/s",
        "read(us)",
        "std(us)",
        "MB/s"
    );
    let _ = writeln!(out, "{}", "-".repeat(96));

    for r in &outcome.results {
        let c = &r.configuration;
        let _ = writeln!(
            out,
            "{:>7} {:>7} {:>7} {:>8} {:>9} | {:>10.2} {:>10.2} {:>10.2} | {:>10.2} {:>10.2} {:>10.2}",
            c.device_count,
            c.worker_count,
            r.effective_buffer_size,
            c.mode.label(),
            r.backend.name(),
            r.write_stats.mean_us(),
            r.write_stats.stddev_us(),
            r.write_stats.throughput_mb_per_s,
            r.read_stats.mean_us(),
            r.read_stats.stddev_us(),
            r.read_stats.throughput_mb_per_s
        );
    }

    let decomposed: Vec<&BenchmarkResult> = outcome
        .results
        .iter()
        .filter(|r| r.breakdown().is_some())
        .collect();
    if !decomposed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Latency decomposition (share of mean round trip)");
        for r in decomposed {
            if let (Some(b), Some(launch), Some(total)) = (r.breakdown(), &r.launch_stats, &r.total_stats) {
                let _ = writeln!(
                    out,
                    "  {}: TO {:.2} us ({:.1}%), LAUNCH {:.2} us ({:.1}%), FROM {:.2} us ({:.1}%), TOTAL {:.2} us",
                    r.configuration,
                    r.write_stats.mean_us(),
                    b.write_pct,
                    launch.mean_us(),
                    b.launch_pct,
                    r.read_stats.mean_us(),
                    b.read_pct,
                    total.mean_us()
                );
            }
        }
    }

    let checked: Vec<&BenchmarkResult> = outcome
        .results
        .iter()
        .filter(|r| r.round_trip.is_some())
        .collect();
    if !checked.is_empty() {
        let failed = checked
            .iter()
            .filter(|r| r.round_trip.is_some_and(|rt| !rt.passed()))
            .count();
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Round trip verified for {} configurations, {} mismatched",
            checked.len(),
            failed
        );
    }

    if !outcome.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed configurations:");
        for f in &outcome.failures {
            let _ = writeln!(out, "  [{}] {}: {}", f.index + 1, f.configuration, f.error);
        }
    }

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(
        out,
        "{} of {} configurations completed",
        outcome.results.len(),
        outcome.attempted()
    );

    out
}
