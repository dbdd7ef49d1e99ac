// src/lib.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chunked host-to-device transfer benchmark for accelerator fleets
//!
//! This library provides:
//! - Chunk planning under the hardware's per-call transfer ceiling
//! - Sequential (per device) and batched (collective per chunk) transfer strategies
//! - Nanosecond timing and integer min/max/mean/stddev reduction with throughput
//! - A sweep runner over device count, worker count, buffer size and mode
//! - An in-process simulated fleet with a loopback fallback
//! - CSV persistence and a text summary

// Core modules
pub mod chunk;
pub mod clock;
pub mod constants;
pub mod error;
pub mod stats;
pub mod transfer;

// Device side
pub mod fleet;
pub mod pattern;

// Driving and reporting
pub mod config;
pub mod report;
pub mod runner;

// Re-export main API
pub use chunk::{ChunkPlan, TransferChunk};
pub use clock::{Clock, Timestamp};
pub use config::SweepConfig;
pub use error::{Error, Result};
pub use fleet::{
    BackendKind, DeviceFleet, Direction, FleetHandle, FleetProfile, Kernel, ProgramImage,
    SimulatedFleet, SimulatorLimits, TransferBatch,
};
pub use pattern::{HostBuffers, HostPattern};
pub use report::{render_csv, render_summary, CsvSink, MemorySink, ResultSink};
pub use runner::{
    BenchmarkConfiguration, BenchmarkResult, BenchmarkRunner, ConfigurationFailure,
    OversizePolicy, RoundTrip, RunnerOptions, RunnerState, SweepAxes, SweepOutcome,
};
pub use stats::{DurationSample, PhaseBreakdown, Stats};
pub use transfer::{TransferMode, TransferStrategy};
