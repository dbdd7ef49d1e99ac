// src/runner.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Benchmark runner: per-configuration state machine and sweep
//!
//! A configuration moves strictly through
//! `Idle -> FleetAllocated -> ProgramLoaded -> TrialLoop -> StatsComputed -> FleetReleased`.
//! Each trial is write, then launch, then read; a phase starts only after
//! the previous one has returned, and trials never overlap. Any failure
//! aborts the configuration, the fleet is released, and the sweep moves on.

use std::fmt;
use std::str::FromStr;

use crate::chunk::ChunkPlan;
use crate::clock::Clock;
use crate::constants::{
    DEFAULT_BUFFER_SIZES, DEFAULT_DEVICE_COUNTS, DEFAULT_SYMBOL, DEFAULT_WORKER_COUNTS,
    MAX_CHUNK_SIZE, NUM_ITERATIONS,
};
use crate::error::{Error, Result};
use crate::fleet::{
    BackendKind, DeviceFleet, Direction, FleetHandle, FleetProfile, ProgramImage, SimulatedFleet,
};
use crate::pattern::{HostBuffers, HostPattern};
use crate::stats::{DurationSample, PhaseBreakdown, Stats};
use crate::transfer::{TransferMode, TransferStrategy};

/// One point of the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkConfiguration {
    pub device_count: usize,
    pub worker_count: usize,
    pub buffer_size: usize,
    pub mode: TransferMode,
}

impl fmt::Display for BenchmarkConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} devices, {} workers, {} bytes, {}",
            self.device_count, self.worker_count, self.buffer_size, self.mode
        )
    }
}

/// Sweep axes; configurations are their Cartesian product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepAxes {
    pub device_counts: Vec<usize>,
    pub worker_counts: Vec<usize>,
    pub buffer_sizes: Vec<usize>,
    pub modes: Vec<TransferMode>,
}

impl SweepAxes {
    /// Configurations ordered devices, then workers, then size, then mode
    pub fn configurations(&self) -> Vec<BenchmarkConfiguration> {
        let mut configs = Vec::with_capacity(self.len());
        for &device_count in &self.device_counts {
            for &worker_count in &self.worker_counts {
                for &buffer_size in &self.buffer_sizes {
                    for &mode in &self.modes {
                        configs.push(BenchmarkConfiguration {
                            device_count,
                            worker_count,
                            buffer_size,
                            mode,
                        });
                    }
                }
            }
        }
        configs
    }

    pub fn len(&self) -> usize {
        self.device_counts.len() * self.worker_counts.len() * self.buffer_sizes.len() * self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SweepAxes {
    fn default() -> Self {
        Self {
            device_counts: DEFAULT_DEVICE_COUNTS.to_vec(),
            worker_counts: DEFAULT_WORKER_COUNTS.to_vec(),
            buffer_sizes: DEFAULT_BUFFER_SIZES.to_vec(),
            modes: TransferMode::ALL.to_vec(),
        }
    }
}

/// What to do when a buffer exceeds the device symbol's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Fail the configuration before any write
    #[default]
    Reject,
    /// Shrink the buffer to the capacity and warn
    Clamp,
}

impl FromStr for OversizePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(OversizePolicy::Reject),
            "clamp" => Ok(OversizePolicy::Clamp),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown oversize policy `{}`",
                other
            ))),
        }
    }
}

/// Runner settings shared by every configuration of a sweep
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Trials per configuration
    pub iterations: usize,
    pub max_chunk_size: usize,
    /// Device symbol the buffers are transferred into
    pub symbol: String,
    pub program: ProgramImage,
    pub pattern: HostPattern,
    /// Also reduce launch and total round-trip samples
    pub decompose: bool,
    /// Check the host buffers against the kernel's effect after the last trial
    pub verify: bool,
    /// Run on the loopback fleet when the primary fleet cannot be allocated
    pub fallback_to_loopback: bool,
    pub oversize: OversizePolicy,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            iterations: NUM_ITERATIONS,
            max_chunk_size: MAX_CHUNK_SIZE,
            symbol: DEFAULT_SYMBOL.to_string(),
            program: ProgramImage::swap(),
            pattern: HostPattern::default(),
            decompose: false,
            verify: false,
            fallback_to_loopback: false,
            oversize: OversizePolicy::Reject,
        }
    }
}

/// Outcome of the round-trip check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTrip {
    pub members_checked: usize,
    pub mismatched_bytes: usize,
}

impl RoundTrip {
    pub fn passed(&self) -> bool {
        self.mismatched_bytes == 0
    }
}

/// Statistics for one configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub configuration: BenchmarkConfiguration,
    /// Backend that actually serviced the configuration
    pub backend: BackendKind,
    /// Bytes per device actually transferred (differs from the configured size only when clamped)
    pub effective_buffer_size: usize,
    pub write_stats: Stats,
    pub read_stats: Stats,
    pub launch_stats: Option<Stats>,
    pub total_stats: Option<Stats>,
    pub round_trip: Option<RoundTrip>,
}

impl BenchmarkResult {
    /// Per-phase share of the round trip, in decomposition runs
    pub fn breakdown(&self) -> Option<PhaseBreakdown> {
        match (&self.launch_stats, &self.total_stats) {
            (Some(launch), Some(total)) => Some(PhaseBreakdown::new(
                &self.write_stats,
                launch,
                &self.read_stats,
                total,
            )),
            _ => None,
        }
    }
}

/// Lifecycle of one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    FleetAllocated,
    ProgramLoaded,
    TrialLoop,
    StatsComputed,
    FleetReleased,
}

/// A configuration dropped from the sweep
#[derive(Debug)]
pub struct ConfigurationFailure {
    /// Position in the sweep
    pub index: usize,
    pub configuration: BenchmarkConfiguration,
    pub error: Error,
}

/// Everything a sweep produced, in sweep order
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub results: Vec<BenchmarkResult>,
    pub failures: Vec<ConfigurationFailure>,
}

impl SweepOutcome {
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// Drives configurations against a device fleet
pub struct BenchmarkRunner<F: DeviceFleet> {
    fleet: F,
    loopback: Option<SimulatedFleet>,
    options: RunnerOptions,
    clock: Clock,
    state: RunnerState,
}

impl<F: DeviceFleet> BenchmarkRunner<F> {
    pub fn new(fleet: F, options: RunnerOptions) -> Self {
        Self {
            fleet,
            loopback: None,
            options,
            clock: Clock::new(),
            state: RunnerState::Idle,
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn fleet(&self) -> &F {
        &self.fleet
    }

    pub fn into_fleet(self) -> F {
        self.fleet
    }

    /// Run every configuration in order, dropping the ones that fail
    pub fn run_sweep(&mut self, configs: &[BenchmarkConfiguration]) -> SweepOutcome {
        let total = configs.len();
        let mut outcome = SweepOutcome::default();

        for (index, config) in configs.iter().enumerate() {
            tracing::info!("[{}/{}] Testing: {}", index + 1, total, config);
            match self.run_configuration(config) {
                Ok(result) => {
                    tracing::info!(
                        "[{}/{}] write {:.2} us ({:.2} MB/s), read {:.2} us ({:.2} MB/s)",
                        index + 1,
                        total,
                        result.write_stats.mean_us(),
                        result.write_stats.throughput_mb_per_s,
                        result.read_stats.mean_us(),
                        result.read_stats.throughput_mb_per_s
                    );
                    outcome.results.push(result);
                }
                Err(error) => {
                    tracing::error!("[{}/{}] {} failed: {}", index + 1, total, config, error);
                    outcome.failures.push(ConfigurationFailure {
                        index,
                        configuration: *config,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "Sweep complete: {} of {} configurations succeeded",
            outcome.results.len(),
            total
        );
        outcome
    }

    /// Allocate, load, run all trials, reduce, release
    pub fn run_configuration(&mut self, config: &BenchmarkConfiguration) -> Result<BenchmarkResult> {
        transition(&mut self.state, RunnerState::Idle);

        if self.options.iterations == 0 {
            return Err(Error::InvalidConfiguration(
                "at least one trial per configuration is required".to_string(),
            ));
        }
        ChunkPlan::new(config.buffer_size, self.options.max_chunk_size)?;

        let profile = FleetProfile {
            backend: self.fleet.backend(),
            workers: config.worker_count,
        };

        // Real fleet first; the loopback is only chosen here, once, when that fails.
        let (fleet, handle): (&mut dyn DeviceFleet, FleetHandle) =
            match self.fleet.allocate(config.device_count, &profile) {
                Ok(handle) => (&mut self.fleet, handle),
                Err(Error::Allocation(reason)) if self.options.fallback_to_loopback => {
                    tracing::warn!(
                        "{} allocation failed ({}), falling back to loopback",
                        profile.backend,
                        reason
                    );
                    let loopback = self.loopback.get_or_insert_with(SimulatedFleet::loopback);
                    let profile = FleetProfile {
                        backend: BackendKind::Loopback,
                        ..profile
                    };
                    let handle = loopback.allocate(config.device_count, &profile)?;
                    (loopback, handle)
                }
                Err(e) => return Err(e),
            };
        transition(&mut self.state, RunnerState::FleetAllocated);

        let backend = fleet.backend();
        let outcome = drive(
            &mut *fleet,
            &handle,
            &self.options,
            &self.clock,
            &mut self.state,
            config,
        );
        let released = fleet.release(handle);
        transition(&mut self.state, RunnerState::FleetReleased);

        match (outcome, released) {
            (Ok(measured), Ok(())) => Ok(BenchmarkResult {
                configuration: *config,
                backend,
                effective_buffer_size: measured.buffer_size,
                write_stats: measured.write_stats,
                read_stats: measured.read_stats,
                launch_stats: measured.launch_stats,
                total_stats: measured.total_stats,
                round_trip: measured.round_trip,
            }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    tracing::warn!("release after failure also failed: {}", release_err);
                }
                Err(e)
            }
        }
    }
}

struct Measured {
    buffer_size: usize,
    write_stats: Stats,
    read_stats: Stats,
    launch_stats: Option<Stats>,
    total_stats: Option<Stats>,
    round_trip: Option<RoundTrip>,
}

fn transition(state: &mut RunnerState, next: RunnerState) {
    tracing::debug!("runner: {:?} -> {:?}", state, next);
    *state = next;
}

/// Everything between allocation and release
fn drive(
    fleet: &mut dyn DeviceFleet,
    handle: &FleetHandle,
    options: &RunnerOptions,
    clock: &Clock,
    state: &mut RunnerState,
    config: &BenchmarkConfiguration,
) -> Result<Measured> {
    fleet.load(handle, &options.program)?;
    transition(state, RunnerState::ProgramLoaded);

    let capacity = fleet.symbol_size(handle, &options.symbol)?;
    let buffer_size = if config.buffer_size > capacity {
        match options.oversize {
            OversizePolicy::Reject => {
                return Err(Error::InvalidConfiguration(format!(
                    "buffer of {} bytes exceeds `{}` capacity of {} bytes",
                    config.buffer_size, options.symbol, capacity
                )));
            }
            OversizePolicy::Clamp => {
                tracing::warn!(
                    "clamping buffer from {} to {} bytes (`{}` capacity)",
                    config.buffer_size,
                    capacity,
                    options.symbol
                );
                capacity
            }
        }
    } else {
        config.buffer_size
    };

    let plan = ChunkPlan::new(buffer_size, options.max_chunk_size)?;
    let mut host = HostBuffers::new(config.device_count, buffer_size, options.pattern);
    let symbol = options.symbol.as_str();

    let iterations = options.iterations;
    let mut writes: Vec<DurationSample> = Vec::with_capacity(iterations);
    let mut launches: Vec<DurationSample> = Vec::with_capacity(iterations);
    let mut reads: Vec<DurationSample> = Vec::with_capacity(iterations);
    let mut totals: Vec<DurationSample> = Vec::with_capacity(iterations);

    transition(state, RunnerState::TrialLoop);
    for trial in 0..iterations {
        host.reset();

        let round_start = clock.now();
        let write_ns = config.mode.transfer(
            fleet,
            handle,
            Direction::ToDevice,
            symbol,
            &plan,
            host.as_mut_slices(),
            clock,
        )?;
        let (executed, launch_ns) = clock.measure(|| fleet.execute(handle));
        executed?;
        let read_ns = config.mode.transfer(
            fleet,
            handle,
            Direction::FromDevice,
            symbol,
            &plan,
            host.as_mut_slices(),
            clock,
        )?;
        let total_ns = Clock::elapsed(round_start, clock.now());

        tracing::debug!(
            "trial {}/{}: write={} launch={} read={} total={} ns",
            trial + 1,
            iterations,
            write_ns,
            launch_ns,
            read_ns,
            total_ns
        );

        writes.push(write_ns);
        launches.push(launch_ns);
        reads.push(read_ns);
        totals.push(total_ns);
    }

    let round_trip = options
        .verify
        .then(|| check_round_trip(&host, options, symbol));
    if let Some(check) = &round_trip {
        if !check.passed() {
            tracing::warn!(
                "round trip mismatch: {} bytes across {} members",
                check.mismatched_bytes,
                check.members_checked
            );
        }
    }

    let bytes = (buffer_size * config.device_count) as u64;
    let measured = Measured {
        buffer_size,
        write_stats: Stats::from_samples(&writes, bytes)?,
        read_stats: Stats::from_samples(&reads, bytes)?,
        launch_stats: if options.decompose {
            Some(Stats::from_samples(&launches, bytes)?)
        } else {
            None
        },
        total_stats: if options.decompose {
            Some(Stats::from_samples(&totals, bytes)?)
        } else {
            None
        },
        round_trip,
    };
    transition(state, RunnerState::StatsComputed);

    Ok(measured)
}

/// Compare each host buffer with its pattern after the kernel ran on the device
fn check_round_trip(host: &HostBuffers, options: &RunnerOptions, symbol: &str) -> RoundTrip {
    let kernel_applies = options.program.primary_symbol() == Some(symbol);
    let mut mismatched_bytes = 0;

    for (member, actual) in host.as_slices().iter().enumerate() {
        let mut expected = host.expected(member);
        if kernel_applies {
            options.program.kernel.apply(&mut expected);
        }
        mismatched_bytes += expected
            .iter()
            .zip(actual.iter())
            .filter(|(e, a)| e != a)
            .count();
    }

    RoundTrip {
        members_checked: host.device_count(),
        mismatched_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Kernel, SimulatorLimits};

    fn init_tracing() {
        use tracing_subscriber::{fmt, EnvFilter};
        let _ = fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    fn config(devices: usize, size: usize, mode: TransferMode) -> BenchmarkConfiguration {
        BenchmarkConfiguration {
            device_count: devices,
            worker_count: 1,
            buffer_size: size,
            mode,
        }
    }

    fn quick_options() -> RunnerOptions {
        RunnerOptions {
            iterations: 4,
            verify: true,
            ..RunnerOptions::default()
        }
    }

    #[test]
    fn test_axes_cartesian_order() {
        let axes = SweepAxes {
            device_counts: vec![1, 2],
            worker_counts: vec![1],
            buffer_sizes: vec![512, 1024],
            modes: TransferMode::ALL.to_vec(),
        };
        let configs = axes.configurations();
        assert_eq!(configs.len(), axes.len());
        assert_eq!(configs.len(), 8);
        assert_eq!(configs[0], config(1, 512, TransferMode::Sequential));
        assert_eq!(configs[1], config(1, 512, TransferMode::Batched));
        assert_eq!(configs[2], config(1, 1024, TransferMode::Sequential));
        assert_eq!(configs[7], config(2, 1024, TransferMode::Batched));
    }

    #[test]
    fn test_default_axes_match_full_sweep() {
        assert_eq!(SweepAxes::default().len(), 5 * 4 * 5 * 2);
    }

    #[test]
    fn test_round_trip_complements_first_byte() {
        init_tracing();
        for mode in TransferMode::ALL {
            let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), quick_options());
            let result = runner.run_configuration(&config(3, 4096, mode)).unwrap();
            let check = result.round_trip.unwrap();
            assert!(check.passed(), "{:?}", check);
            assert_eq!(check.members_checked, 3);
            assert_eq!(result.write_stats.samples, 4);
            assert_eq!(result.backend, BackendKind::Simulator);
            assert_eq!(runner.state(), RunnerState::FleetReleased);
            assert_eq!(runner.fleet().devices_in_use(), 0);
        }
    }

    #[test]
    fn test_passthrough_program_leaves_buffers_unchanged() {
        let options = RunnerOptions {
            program: ProgramImage::tasklets(),
            ..quick_options()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        let result = runner
            .run_configuration(&config(2, 1000, TransferMode::Batched))
            .unwrap();
        assert!(result.round_trip.unwrap().passed());
    }

    #[test]
    fn test_oversize_rejected_and_released() {
        let options = RunnerOptions {
            program: ProgramImage::proto(),
            ..quick_options()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        let err = runner
            .run_configuration(&config(2, 4096, TransferMode::Sequential))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(runner.fleet().devices_in_use(), 0);
    }

    #[test]
    fn test_oversize_clamped() {
        let options = RunnerOptions {
            program: ProgramImage::proto(),
            oversize: OversizePolicy::Clamp,
            ..quick_options()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        let result = runner
            .run_configuration(&config(1, 4096, TransferMode::Sequential))
            .unwrap();
        assert_eq!(result.effective_buffer_size, 2048);
        assert_eq!(result.configuration.buffer_size, 4096);
    }

    #[test]
    fn test_decomposition_stats() {
        let options = RunnerOptions {
            decompose: true,
            ..quick_options()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        let result = runner
            .run_configuration(&config(1, 4096, TransferMode::Batched))
            .unwrap();
        let total = result.total_stats.unwrap();
        let launch = result.launch_stats.unwrap();
        assert!(total.mean >= launch.mean);
        assert!(total.mean >= result.write_stats.mean);
        let breakdown = result.breakdown().unwrap();
        let sum = breakdown.write_pct + breakdown.launch_pct + breakdown.read_pct;
        assert!(sum <= 100.0 + 1e-6, "phases exceed total: {}", sum);
    }

    #[test]
    fn test_plain_run_has_no_decomposition() {
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), quick_options());
        let result = runner
            .run_configuration(&config(1, 512, TransferMode::Sequential))
            .unwrap();
        assert!(result.launch_stats.is_none());
        assert!(result.total_stats.is_none());
        assert!(result.breakdown().is_none());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let options = RunnerOptions {
            iterations: 0,
            ..RunnerOptions::default()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        assert!(matches!(
            runner.run_configuration(&config(1, 512, TransferMode::Sequential)),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let options = RunnerOptions {
            max_chunk_size: 0,
            ..RunnerOptions::default()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        assert!(matches!(
            runner.run_configuration(&config(1, 512, TransferMode::Sequential)),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_fallback_to_loopback() {
        init_tracing();
        let small = SimulatedFleet::new(SimulatorLimits {
            pool_size: 2,
            ..SimulatorLimits::default()
        });
        let options = RunnerOptions {
            fallback_to_loopback: true,
            ..quick_options()
        };
        let mut runner = BenchmarkRunner::new(small, options);
        let result = runner
            .run_configuration(&config(8, 2048, TransferMode::Batched))
            .unwrap();
        assert_eq!(result.backend, BackendKind::Loopback);
        assert!(result.round_trip.unwrap().passed());

        let result = runner
            .run_configuration(&config(2, 2048, TransferMode::Batched))
            .unwrap();
        assert_eq!(result.backend, BackendKind::Simulator);
    }

    #[test]
    fn test_sweep_survives_allocation_failure() {
        let small = SimulatedFleet::new(SimulatorLimits {
            pool_size: 4,
            ..SimulatorLimits::default()
        });
        let mut runner = BenchmarkRunner::new(small, quick_options());
        let configs = [
            config(1, 512, TransferMode::Sequential),
            config(16, 512, TransferMode::Sequential),
            config(4, 1024, TransferMode::Batched),
        ];
        let outcome = runner.run_sweep(&configs);
        assert_eq!(outcome.attempted(), 3);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].configuration, configs[0]);
        assert_eq!(outcome.results[1].configuration, configs[2]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert!(matches!(outcome.failures[0].error, Error::Allocation(_)));
    }

    #[test]
    fn test_seeded_pattern_round_trip() {
        let options = RunnerOptions {
            pattern: HostPattern::Seeded(99),
            program: ProgramImage::new(
                "custom",
                vec![("scratch".to_string(), 8192), (DEFAULT_SYMBOL.to_string(), 8192)],
                Kernel::ComplementFirstByte,
            ),
            ..quick_options()
        };
        // `mram_buffer` is not the primary symbol here, so the kernel never touches it
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        let result = runner
            .run_configuration(&config(2, 3000, TransferMode::Sequential))
            .unwrap();
        assert!(result.round_trip.unwrap().passed());
    }

    #[test]
    fn test_missing_symbol_is_not_found() {
        let options = RunnerOptions {
            symbol: "swap_area".to_string(),
            ..quick_options()
        };
        let mut runner = BenchmarkRunner::new(SimulatedFleet::default(), options);
        let err = runner
            .run_configuration(&config(1, 512, TransferMode::Sequential))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(runner.fleet().devices_in_use(), 0);
    }
}
