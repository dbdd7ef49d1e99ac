// src/fleet/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device fleet collaborator interface
//!
//! Every call takes an explicit [`FleetHandle`]; a fleet implementation keeps
//! its per-handle state internally and nothing is process-global, so tests
//! can substitute any [`DeviceFleet`] they like.

pub mod simulator;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::constants::{DEFAULT_SYMBOL, PROTO_BUFFER_CAPACITY, SWAP_BUFFER_CAPACITY};
use crate::error::{Error, Result};

pub use simulator::{SimulatedFleet, SimulatorLimits};

/// Opaque reference to an allocated set of devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FleetHandle {
    id: u64,
    members: usize,
}

impl FleetHandle {
    pub fn new(id: u64, members: usize) -> Self {
        Self { id, members }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn member_count(&self) -> usize {
        self.members
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device (write)
    ToDevice,
    /// Device to host (read)
    FromDevice,
}

/// Which collaborator services a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Software simulator with a finite device pool and hardware transfer limits
    #[default]
    Simulator,
    /// Unbounded in-process loopback
    Loopback,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Simulator => "simulator",
            BackendKind::Loopback => "loopback",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "simulator" | "sim" => Ok(BackendKind::Simulator),
            "loopback" => Ok(BackendKind::Loopback),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown device backend `{}`",
                other
            ))),
        }
    }
}

/// Allocation profile handed to [`DeviceFleet::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetProfile {
    pub backend: BackendKind,
    /// Worker (tasklet) count each device runs the program with
    pub workers: usize,
}

impl fmt::Display for FleetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend={},nr_tasklets={}", self.backend, self.workers)
    }
}

/// Device-side routine run by [`DeviceFleet::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Complement byte 0 of the primary symbol; the round-trip witness
    ComplementFirstByte,
    /// Touch nothing
    Passthrough,
}

impl Kernel {
    /// Apply the kernel to a symbol's contents
    pub fn apply(&self, symbol: &mut [u8]) {
        match self {
            Kernel::ComplementFirstByte => {
                if let Some(first) = symbol.first_mut() {
                    *first = !*first;
                }
            }
            Kernel::Passthrough => {}
        }
    }
}

/// Program loaded onto every device of a fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    pub name: String,
    /// Declared symbols and their capacities in bytes; the first is primary
    pub symbols: Vec<(String, usize)>,
    pub kernel: Kernel,
}

impl ProgramImage {
    pub fn new(name: impl Into<String>, symbols: Vec<(String, usize)>, kernel: Kernel) -> Self {
        Self {
            name: name.into(),
            symbols,
            kernel,
        }
    }

    /// 64 KiB swap buffer, complements byte 0 on execute
    pub fn swap() -> Self {
        Self::new(
            "dpu_swap",
            vec![(DEFAULT_SYMBOL.to_string(), SWAP_BUFFER_CAPACITY)],
            Kernel::ComplementFirstByte,
        )
    }

    /// Single-chunk prototype buffer, complements byte 0 on execute
    pub fn proto() -> Self {
        Self::new(
            "dpu",
            vec![(DEFAULT_SYMBOL.to_string(), PROTO_BUFFER_CAPACITY)],
            Kernel::ComplementFirstByte,
        )
    }

    /// 64 KiB buffer read but never written by each worker
    pub fn tasklets() -> Self {
        Self::new(
            "dpu_tasklets",
            vec![(DEFAULT_SYMBOL.to_string(), SWAP_BUFFER_CAPACITY)],
            Kernel::Passthrough,
        )
    }

    pub fn symbol_capacity(&self, name: &str) -> Option<usize> {
        self.symbols
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cap)| *cap)
    }

    pub fn primary_symbol(&self) -> Option<&str> {
        self.symbols.first().map(|(n, _)| n.as_str())
    }
}

/// Host slices registered for one collective transfer
///
/// Each entry pairs a member index with the host bytes for that member at the
/// collective's offset. Writes read from the slices, reads fill them.
#[derive(Debug, Default)]
pub struct TransferBatch<'a> {
    entries: Vec<(usize, &'a mut [u8])>,
}

impl<'a> TransferBatch<'a> {
    pub fn with_capacity(members: usize) -> Self {
        Self {
            entries: Vec::with_capacity(members),
        }
    }

    /// Register `host` as member `member`'s side of the transfer
    pub fn prepare(&mut self, member: usize, host: &'a mut [u8]) {
        self.entries.push((member, host));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered (member, host slice) pairs, in registration order
    pub fn entries_mut(&mut self) -> &mut [(usize, &'a mut [u8])] {
        &mut self.entries
    }

    pub fn members(&self) -> Vec<usize> {
        self.entries.iter().map(|(m, _)| *m).collect()
    }
}

/// Minimum surface the benchmark needs from a device fleet
pub trait DeviceFleet {
    fn backend(&self) -> BackendKind;

    fn allocate(&mut self, count: usize, profile: &FleetProfile) -> Result<FleetHandle>;

    fn load(&mut self, handle: &FleetHandle, program: &ProgramImage) -> Result<()>;

    /// Declared capacity of `name` in the loaded program
    fn symbol_size(&self, handle: &FleetHandle, name: &str) -> Result<usize>;

    /// Push `data` into one member's `symbol` at `offset`
    fn write_chunk(
        &mut self,
        handle: &FleetHandle,
        member: usize,
        symbol: &str,
        offset: usize,
        data: &[u8],
    ) -> Result<()>;

    /// Pull `length` bytes of one member's `symbol` at `offset`
    fn read_chunk(
        &mut self,
        handle: &FleetHandle,
        member: usize,
        symbol: &str,
        offset: usize,
        length: usize,
    ) -> Result<Bytes>;

    /// One call moving `length` bytes at `offset` for every prepared member
    fn push_collective(
        &mut self,
        handle: &FleetHandle,
        direction: Direction,
        symbol: &str,
        offset: usize,
        length: usize,
        batch: TransferBatch<'_>,
    ) -> Result<()>;

    /// Run the loaded program on every member and wait for completion
    fn execute(&mut self, handle: &FleetHandle) -> Result<()>;

    fn release(&mut self, handle: FleetHandle) -> Result<()>;
}
