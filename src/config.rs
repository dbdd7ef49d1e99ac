// src/config.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sweep configuration from `XFERBENCH_*` environment variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `XFERBENCH_BACKEND` | `simulator` or `loopback` | `simulator` |
//! | `XFERBENCH_ITERATIONS` | trials per configuration | 20 |
//! | `XFERBENCH_DEVICES` | device counts, comma separated | `1,8,16,32,64` |
//! | `XFERBENCH_WORKERS` | worker counts | `1,4,8,16` |
//! | `XFERBENCH_SIZES` | buffer sizes in bytes | `512,1024,2048,4096,8192` |
//! | `XFERBENCH_MODES` | `serial`, `parallel` | both |
//! | `XFERBENCH_PROGRAM` | `swap`, `proto` or `tasklets` | `swap` |
//! | `XFERBENCH_OUTPUT` | CSV path | `benchmark_results.csv` |
//! | `XFERBENCH_DECOMPOSE` | report launch and total phases | off |
//! | `XFERBENCH_VERIFY` | check the round trip after the last trial | off |
//! | `XFERBENCH_FALLBACK` | run on loopback when allocation fails | off |
//! | `XFERBENCH_OVERSIZE` | `reject` or `clamp` | `reject` |
//! | `XFERBENCH_SEED` | seeded pattern instead of the 0xA5 fill; `random` draws one | unset |
//! | `XFERBENCH_DISPATCH_NS` | simulated per-call cost | 1000 |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_OUTPUT_PATH, NUM_ITERATIONS};
use crate::error::{Error, Result};
use crate::fleet::{BackendKind, ProgramImage, SimulatedFleet};
use crate::pattern::{random_seed, HostPattern};
use crate::runner::{OversizePolicy, RunnerOptions, SweepAxes};
use crate::transfer::TransferMode;

const ENV_PREFIX: &str = "XFERBENCH_";

/// Default simulated dispatch cost per collaborator call
pub const DEFAULT_DISPATCH_NS: u64 = 1000;

/// Everything one sweep run needs
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub backend: BackendKind,
    pub axes: SweepAxes,
    /// Trials per configuration
    pub iterations: usize,
    pub program: ProgramImage,
    pub output: PathBuf,
    pub decompose: bool,
    pub verify: bool,
    pub fallback_to_loopback: bool,
    pub oversize: OversizePolicy,
    /// Seed for the host pattern (None = fixed 0xA5 fill)
    pub seed: Option<u64>,
    /// Busy-wait per simulator call
    pub dispatch_overhead: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            axes: SweepAxes::default(),
            iterations: NUM_ITERATIONS,
            program: ProgramImage::swap(),
            output: PathBuf::from(DEFAULT_OUTPUT_PATH),
            decompose: false,
            verify: false,
            fallback_to_loopback: false,
            oversize: OversizePolicy::default(),
            seed: None,
            dispatch_overhead: Duration::from_nanos(DEFAULT_DISPATCH_NS),
        }
    }
}

impl SweepConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; keys carry the `XFERBENCH_` prefix
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("BACKEND") {
            config.backend = v.parse()?;
        }
        if let Some(v) = get("ITERATIONS") {
            config.iterations = parse_number("ITERATIONS", &v)?;
            if config.iterations == 0 {
                return Err(Error::InvalidConfiguration(
                    "XFERBENCH_ITERATIONS must be at least 1".to_string(),
                ));
            }
        }
        if let Some(v) = get("DEVICES") {
            config.axes.device_counts = parse_list("DEVICES", &v, parse_number)?;
        }
        if let Some(v) = get("WORKERS") {
            config.axes.worker_counts = parse_list("WORKERS", &v, parse_number)?;
        }
        if let Some(v) = get("SIZES") {
            config.axes.buffer_sizes = parse_list("SIZES", &v, parse_number)?;
        }
        if let Some(v) = get("MODES") {
            config.axes.modes = parse_list("MODES", &v, |_, item| TransferMode::from_str(item))?;
        }
        if let Some(v) = get("PROGRAM") {
            config.program = parse_program(&v)?;
        }
        if let Some(v) = get("OUTPUT") {
            config.output = PathBuf::from(v);
        }
        if let Some(v) = get("DECOMPOSE") {
            config.decompose = parse_flag("DECOMPOSE", &v)?;
        }
        if let Some(v) = get("VERIFY") {
            config.verify = parse_flag("VERIFY", &v)?;
        }
        if let Some(v) = get("FALLBACK") {
            config.fallback_to_loopback = parse_flag("FALLBACK", &v)?;
        }
        if let Some(v) = get("OVERSIZE") {
            config.oversize = v.parse()?;
        }
        if let Some(v) = get("SEED") {
            config.seed = Some(if v.eq_ignore_ascii_case("random") {
                let seed = random_seed();
                tracing::info!("XFERBENCH_SEED=random drew seed {}", seed);
                seed
            } else {
                parse_number("SEED", &v)?
            });
        }
        if let Some(v) = get("DISPATCH_NS") {
            config.dispatch_overhead = Duration::from_nanos(parse_number("DISPATCH_NS", &v)?);
        }

        tracing::debug!("Sweep configuration: {:?}", config);
        Ok(config)
    }

    /// Host pattern implied by `seed`
    pub fn pattern(&self) -> HostPattern {
        self.seed.map_or_else(HostPattern::default, HostPattern::Seeded)
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            iterations: self.iterations,
            program: self.program.clone(),
            pattern: self.pattern(),
            decompose: self.decompose,
            verify: self.verify,
            fallback_to_loopback: self.fallback_to_loopback,
            oversize: self.oversize,
            ..RunnerOptions::default()
        }
    }

    /// Primary fleet for the configured backend
    pub fn build_fleet(&self) -> SimulatedFleet {
        SimulatedFleet::for_backend(self.backend, self.dispatch_overhead)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::InvalidConfiguration(format!(
            "{}{}: `{}` is not a valid number",
            ENV_PREFIX, name, value
        ))
    })
}

fn parse_list<T>(
    name: &str,
    value: &str,
    parse: impl Fn(&str, &str) -> Result<T>,
) -> Result<Vec<T>> {
    let items = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse(name, item))
        .collect::<Result<Vec<T>>>()?;
    if items.is_empty() {
        return Err(Error::InvalidConfiguration(format!(
            "{}{} lists no values",
            ENV_PREFIX, name
        )));
    }
    Ok(items)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfiguration(format!(
            "{}{}: `{}` is not a boolean",
            ENV_PREFIX, name, value
        ))),
    }
}

fn parse_program(value: &str) -> Result<ProgramImage> {
    match value.to_lowercase().as_str() {
        "swap" => Ok(ProgramImage::swap()),
        "proto" => Ok(ProgramImage::proto()),
        "tasklets" => Ok(ProgramImage::tasklets()),
        other => Err(Error::InvalidConfiguration(format!(
            "unknown program image `{}`",
            other
        ))),
    }
}
