// src/fleet/simulator.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process device fleet
//!
//! The simulator enforces what real hardware would: a finite device pool, a
//! worker ceiling, and a per-call transfer ceiling. It can also spin for a
//! fixed dispatch cost per collaborator call, which is what separates the
//! sequential and batched strategies when no hardware is attached.
//! [`SimulatedFleet::loopback`] drops every limit and is the fallback when the
//! primary fleet cannot be allocated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::{
    BackendKind, DeviceFleet, Direction, FleetHandle, FleetProfile, ProgramImage, TransferBatch,
};
use crate::constants::{DEVICE_MEMORY_SIZE, MAX_CHUNK_SIZE, MAX_WORKERS, SIMULATOR_POOL_SIZE};
use crate::error::{Error, Result};

/// Hardware limits the simulator enforces
#[derive(Debug, Clone)]
pub struct SimulatorLimits {
    /// Devices available across all live handles
    pub pool_size: usize,
    /// Largest payload per transfer call
    pub max_transfer: usize,
    /// Highest accepted worker count
    pub max_workers: usize,
    /// Busy-wait added to every collaborator call
    pub dispatch_overhead: Duration,
}

impl SimulatorLimits {
    pub fn unbounded() -> Self {
        Self {
            pool_size: usize::MAX,
            max_transfer: usize::MAX,
            max_workers: usize::MAX,
            dispatch_overhead: Duration::ZERO,
        }
    }
}

impl Default for SimulatorLimits {
    fn default() -> Self {
        Self {
            pool_size: SIMULATOR_POOL_SIZE,
            max_transfer: MAX_CHUNK_SIZE,
            max_workers: MAX_WORKERS,
            dispatch_overhead: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct SimDevice {
    memory: HashMap<String, Vec<u8>>,
}

#[derive(Debug)]
struct SimSet {
    members: Vec<SimDevice>,
    profile: FleetProfile,
    program: Option<ProgramImage>,
}

/// Software device fleet
#[derive(Debug)]
pub struct SimulatedFleet {
    kind: BackendKind,
    limits: SimulatorLimits,
    sets: HashMap<u64, SimSet>,
    next_id: u64,
    in_use: usize,
}

impl SimulatedFleet {
    pub fn new(limits: SimulatorLimits) -> Self {
        Self {
            kind: BackendKind::Simulator,
            limits,
            sets: HashMap::new(),
            next_id: 1,
            in_use: 0,
        }
    }

    /// Fleet with no pool, worker or transfer limits
    pub fn loopback() -> Self {
        Self {
            kind: BackendKind::Loopback,
            ..Self::new(SimulatorLimits::unbounded())
        }
    }

    /// Fleet for a backend selector, with `dispatch_overhead` per call on the simulator
    pub fn for_backend(kind: BackendKind, dispatch_overhead: Duration) -> Self {
        match kind {
            BackendKind::Simulator => Self::new(SimulatorLimits {
                dispatch_overhead,
                ..SimulatorLimits::default()
            }),
            BackendKind::Loopback => Self::loopback(),
        }
    }

    pub fn limits(&self) -> &SimulatorLimits {
        &self.limits
    }

    /// Devices currently held by live handles
    pub fn devices_in_use(&self) -> usize {
        self.in_use
    }

    /// Copy of one member's symbol contents, for inspection
    pub fn snapshot(&self, handle: &FleetHandle, member: usize, symbol: &str) -> Result<Vec<u8>> {
        let set = self.set(handle)?;
        let device = set
            .members
            .get(member)
            .ok_or_else(|| Error::Transfer(format!("member {} out of range", member)))?;
        device
            .memory
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::NotFound(symbol.to_string()))
    }

    fn dispatch(&self) {
        let overhead = self.limits.dispatch_overhead;
        if overhead.is_zero() {
            return;
        }
        let start = Instant::now();
        while start.elapsed() < overhead {
            std::hint::spin_loop();
        }
    }

    fn set(&self, handle: &FleetHandle) -> Result<&SimSet> {
        self.sets
            .get(&handle.id())
            .filter(|s| s.members.len() == handle.member_count())
            .ok_or(Error::UnknownHandle(handle.id()))
    }

    fn set_mut(&mut self, handle: &FleetHandle) -> Result<&mut SimSet> {
        self.sets
            .get_mut(&handle.id())
            .filter(|s| s.members.len() == handle.member_count())
            .ok_or(Error::UnknownHandle(handle.id()))
    }

    /// Locate `symbol` on `member` and bounds-check `[offset, offset + length)`
    fn region<'s>(
        set: &'s mut SimSet,
        max_transfer: usize,
        member: usize,
        symbol: &str,
        offset: usize,
        length: usize,
    ) -> Result<&'s mut [u8]> {
        if length > max_transfer {
            return Err(Error::Transfer(format!(
                "{} bytes exceeds the {} byte transfer ceiling",
                length, max_transfer
            )));
        }
        let member_count = set.members.len();
        let device = set.members.get_mut(member).ok_or_else(|| {
            Error::Transfer(format!("member {} out of range ({} members)", member, member_count))
        })?;
        let memory = device
            .memory
            .get_mut(symbol)
            .ok_or_else(|| Error::NotFound(symbol.to_string()))?;
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= memory.len())
            .ok_or_else(|| {
                Error::Transfer(format!(
                    "[{}, {}+{}) overruns `{}` ({} bytes)",
                    offset,
                    offset,
                    length,
                    symbol,
                    memory.len()
                ))
            })?;
        Ok(&mut memory[offset..end])
    }
}

impl Default for SimulatedFleet {
    fn default() -> Self {
        Self::new(SimulatorLimits::default())
    }
}

impl DeviceFleet for SimulatedFleet {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    fn allocate(&mut self, count: usize, profile: &FleetProfile) -> Result<FleetHandle> {
        if count == 0 {
            return Err(Error::Allocation("zero devices requested".to_string()));
        }
        if profile.workers == 0 || profile.workers > self.limits.max_workers {
            return Err(Error::Allocation(format!(
                "profile `{}`: worker count must be within 1..={}",
                profile, self.limits.max_workers
            )));
        }
        let available = self.limits.pool_size.saturating_sub(self.in_use);
        if count > available {
            return Err(Error::Allocation(format!(
                "requested {} devices, {} available",
                count, available
            )));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.in_use += count;
        self.sets.insert(
            id,
            SimSet {
                members: (0..count).map(|_| SimDevice::default()).collect(),
                profile: *profile,
                program: None,
            },
        );

        tracing::debug!("{}: allocated {} devices as handle {} ({})", self.kind, count, id, profile);
        Ok(FleetHandle::new(id, count))
    }

    fn load(&mut self, handle: &FleetHandle, program: &ProgramImage) -> Result<()> {
        if program.symbols.is_empty() {
            return Err(Error::Load(format!("`{}` declares no symbols", program.name)));
        }
        let total: usize = program.symbols.iter().map(|(_, cap)| *cap).sum();
        if total > DEVICE_MEMORY_SIZE {
            return Err(Error::Load(format!(
                "`{}` needs {} bytes of device memory, {} available",
                program.name, total, DEVICE_MEMORY_SIZE
            )));
        }

        let kind = self.kind;
        let set = self.set_mut(handle)?;
        for device in &mut set.members {
            device.memory = program
                .symbols
                .iter()
                .map(|(name, cap)| (name.clone(), vec![0u8; *cap]))
                .collect();
        }
        set.program = Some(program.clone());

        tracing::debug!(
            "{}: loaded `{}` on handle {} ({} workers)",
            kind,
            program.name,
            handle.id(),
            set.profile.workers
        );
        Ok(())
    }

    fn symbol_size(&self, handle: &FleetHandle, name: &str) -> Result<usize> {
        self.set(handle)?
            .program
            .as_ref()
            .and_then(|p| p.symbol_capacity(name))
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn write_chunk(
        &mut self,
        handle: &FleetHandle,
        member: usize,
        symbol: &str,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        self.dispatch();
        let max_transfer = self.limits.max_transfer;
        let set = self.set_mut(handle)?;
        Self::region(set, max_transfer, member, symbol, offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    fn read_chunk(
        &mut self,
        handle: &FleetHandle,
        member: usize,
        symbol: &str,
        offset: usize,
        length: usize,
    ) -> Result<Bytes> {
        self.dispatch();
        let max_transfer = self.limits.max_transfer;
        let set = self.set_mut(handle)?;
        let region = Self::region(set, max_transfer, member, symbol, offset, length)?;
        Ok(Bytes::copy_from_slice(region))
    }

    fn push_collective(
        &mut self,
        handle: &FleetHandle,
        direction: Direction,
        symbol: &str,
        offset: usize,
        length: usize,
        mut batch: TransferBatch<'_>,
    ) -> Result<()> {
        self.dispatch();
        let max_transfer = self.limits.max_transfer;
        let set = self.set_mut(handle)?;
        for (member, host) in batch.entries_mut().iter_mut() {
            let member = *member;
            if host.len() != length {
                return Err(Error::Transfer(format!(
                    "member {} prepared {} bytes for a {} byte collective",
                    member,
                    host.len(),
                    length
                )));
            }
            let region = Self::region(set, max_transfer, member, symbol, offset, length)?;
            match direction {
                Direction::ToDevice => region.copy_from_slice(&**host),
                Direction::FromDevice => host.copy_from_slice(region),
            }
        }
        Ok(())
    }

    fn execute(&mut self, handle: &FleetHandle) -> Result<()> {
        self.dispatch();
        let set = self.set_mut(handle)?;
        let program = set
            .program
            .as_ref()
            .ok_or_else(|| Error::Execution(format!("handle {} has no program loaded", handle.id())))?;
        let primary = program
            .primary_symbol()
            .ok_or_else(|| Error::Execution(format!("`{}` has no primary symbol", program.name)))?;
        for device in &mut set.members {
            let memory = device
                .memory
                .get_mut(primary)
                .ok_or_else(|| Error::Execution(format!("symbol `{}` missing on device", primary)))?;
            program.kernel.apply(memory);
        }
        Ok(())
    }

    fn release(&mut self, handle: FleetHandle) -> Result<()> {
        self.set(&handle)?;
        if let Some(set) = self.sets.remove(&handle.id()) {
            self.in_use -= set.members.len();
        }
        tracing::debug!("{}: released handle {}", self.kind, handle.id());
        Ok(())
    }
}
