// tests/common/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call-recording fleet shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use xferbench::{
    BackendKind, DeviceFleet, Direction, Error, FleetHandle, FleetProfile, ProgramImage, Result,
    SimulatedFleet, SimulatorLimits, TransferBatch,
};

/// One collaborator call as the fleet saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Allocate { count: usize, profile: String },
    Load(String),
    Write { member: usize, offset: usize, length: usize },
    Read { member: usize, offset: usize, length: usize },
    Collective {
        direction: Direction,
        offset: usize,
        length: usize,
        members: Vec<usize>,
    },
    Execute,
    Release,
}

/// A single member's share of a transfer, whichever call carried it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemberTransfer {
    pub to_device: bool,
    pub member: usize,
    pub offset: usize,
    pub length: usize,
}

/// Wraps a simulator and records every call in order
pub struct RecordingFleet {
    inner: SimulatedFleet,
    pub calls: Vec<Call>,
    refuse_counts: Vec<usize>,
    fail_execute_on: Option<usize>,
    executes: usize,
}

impl RecordingFleet {
    pub fn new() -> Self {
        Self::with_limits(SimulatorLimits::default())
    }

    pub fn with_limits(limits: SimulatorLimits) -> Self {
        Self {
            inner: SimulatedFleet::new(limits),
            calls: Vec::new(),
            refuse_counts: Vec::new(),
            fail_execute_on: None,
            executes: 0,
        }
    }

    /// Fail every allocation of exactly `count` devices
    pub fn refusing(mut self, count: usize) -> Self {
        self.refuse_counts.push(count);
        self
    }

    /// Fail the `nth` execute call (1-based) counted across the fleet's lifetime
    pub fn failing_execute_on(mut self, nth: usize) -> Self {
        self.fail_execute_on = Some(nth);
        self
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn devices_in_use(&self) -> usize {
        self.inner.devices_in_use()
    }

    /// Chunk calls flattened to one entry per member, in issue order
    pub fn member_transfers(&self) -> Vec<MemberTransfer> {
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                Call::Write { member, offset, length } => out.push(MemberTransfer {
                    to_device: true,
                    member: *member,
                    offset: *offset,
                    length: *length,
                }),
                Call::Read { member, offset, length } => out.push(MemberTransfer {
                    to_device: false,
                    member: *member,
                    offset: *offset,
                    length: *length,
                }),
                Call::Collective {
                    direction,
                    offset,
                    length,
                    members,
                } => {
                    for member in members {
                        out.push(MemberTransfer {
                            to_device: *direction == Direction::ToDevice,
                            member: *member,
                            offset: *offset,
                            length: *length,
                        });
                    }
                }
                _ => {}
            }
        }
        out
    }
}

impl DeviceFleet for RecordingFleet {
    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    fn allocate(&mut self, count: usize, profile: &FleetProfile) -> Result<FleetHandle> {
        self.calls.push(Call::Allocate {
            count,
            profile: profile.to_string(),
        });
        if self.refuse_counts.contains(&count) {
            return Err(Error::Allocation(format!("{} devices refused", count)));
        }
        self.inner.allocate(count, profile)
    }

    fn load(&mut self, handle: &FleetHandle, program: &ProgramImage) -> Result<()> {
        self.calls.push(Call::Load(program.name.clone()));
        self.inner.load(handle, program)
    }

    fn symbol_size(&self, handle: &FleetHandle, name: &str) -> Result<usize> {
        self.inner.symbol_size(handle, name)
    }

    fn write_chunk(
        &mut self,
        handle: &FleetHandle,
        member: usize,
        symbol: &str,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        self.calls.push(Call::Write {
            member,
            offset,
            length: data.len(),
        });
        self.inner.write_chunk(handle, member, symbol, offset, data)
    }

    fn read_chunk(
        &mut self,
        handle: &FleetHandle,
        member: usize,
        symbol: &str,
        offset: usize,
        length: usize,
    ) -> Result<Bytes> {
        self.calls.push(Call::Read {
            member,
            offset,
            length,
        });
        self.inner.read_chunk(handle, member, symbol, offset, length)
    }

    fn push_collective(
        &mut self,
        handle: &FleetHandle,
        direction: Direction,
        symbol: &str,
        offset: usize,
        length: usize,
        batch: TransferBatch<'_>,
    ) -> Result<()> {
        self.calls.push(Call::Collective {
            direction,
            offset,
            length,
            members: batch.members(),
        });
        self.inner
            .push_collective(handle, direction, symbol, offset, length, batch)
    }

    fn execute(&mut self, handle: &FleetHandle) -> Result<()> {
        self.calls.push(Call::Execute);
        self.executes += 1;
        if self.fail_execute_on == Some(self.executes) {
            return Err(Error::Execution(format!("trap on execute {}", self.executes)));
        }
        self.inner.execute(handle)
    }

    fn release(&mut self, handle: FleetHandle) -> Result<()> {
        self.calls.push(Call::Release);
        self.inner.release(handle)
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
