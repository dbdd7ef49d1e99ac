// src/transfer.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequential and batched transfer strategies
//!
//! Both strategies move the same chunks and the same bytes; they differ only
//! in how calls are grouped:
//! - Sequential: every chunk of device 0, then every chunk of device 1, ...
//! - Batched: chunk 0 for all devices in one collective call, then chunk 1, ...
//!
//! Batched never issues chunk k+1 before the collective for chunk k has
//! returned. There is no pipelining between chunks.

use std::fmt;
use std::str::FromStr;

use crate::chunk::ChunkPlan;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fleet::{DeviceFleet, Direction, FleetHandle, TransferBatch};
use crate::stats::DurationSample;

/// Scheduling discipline for one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// One device fully serviced before the next
    Sequential,
    /// All devices serviced for chunk k before chunk k+1
    Batched,
}

impl TransferMode {
    pub const ALL: [TransferMode; 2] = [TransferMode::Sequential, TransferMode::Batched];

    /// Label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            TransferMode::Sequential => "serial",
            TransferMode::Batched => "parallel",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransferMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "serial" | "sequential" => Ok(TransferMode::Sequential),
            "parallel" | "batched" => Ok(TransferMode::Batched),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown transfer mode `{}`",
                other
            ))),
        }
    }
}

/// Moves every host buffer through a fleet and reports the elapsed time
pub trait TransferStrategy {
    /// Transfer `plan` for all members of `handle` in `direction`
    ///
    /// The returned duration spans from before the first chunk call to after
    /// the last one returns.
    #[allow(clippy::too_many_arguments)]
    fn transfer(
        &self,
        fleet: &mut dyn DeviceFleet,
        handle: &FleetHandle,
        direction: Direction,
        symbol: &str,
        plan: &ChunkPlan,
        buffers: &mut [Vec<u8>],
        clock: &Clock,
    ) -> Result<DurationSample>;
}

impl TransferStrategy for TransferMode {
    fn transfer(
        &self,
        fleet: &mut dyn DeviceFleet,
        handle: &FleetHandle,
        direction: Direction,
        symbol: &str,
        plan: &ChunkPlan,
        buffers: &mut [Vec<u8>],
        clock: &Clock,
    ) -> Result<DurationSample> {
        check_buffers(handle, plan, buffers)?;

        match self {
            TransferMode::Sequential => {
                let start = clock.now();
                sequential(fleet, handle, direction, symbol, plan, buffers)?;
                Ok(Clock::elapsed(start, clock.now()))
            }
            TransferMode::Batched => {
                let batches = register_batches(plan, buffers);
                let start = clock.now();
                batched(fleet, handle, direction, symbol, plan, batches)?;
                Ok(Clock::elapsed(start, clock.now()))
            }
        }
    }
}

fn check_buffers(handle: &FleetHandle, plan: &ChunkPlan, buffers: &[Vec<u8>]) -> Result<()> {
    if buffers.len() != handle.member_count() {
        return Err(Error::InvalidConfiguration(format!(
            "{} host buffers for a {} device fleet",
            buffers.len(),
            handle.member_count()
        )));
    }
    if let Some(short) = buffers.iter().position(|b| b.len() < plan.total_size()) {
        return Err(Error::InvalidConfiguration(format!(
            "host buffer {} holds {} bytes, transfer needs {}",
            short,
            buffers[short].len(),
            plan.total_size()
        )));
    }
    Ok(())
}

fn sequential(
    fleet: &mut dyn DeviceFleet,
    handle: &FleetHandle,
    direction: Direction,
    symbol: &str,
    plan: &ChunkPlan,
    buffers: &mut [Vec<u8>],
) -> Result<()> {
    for (member, buf) in buffers.iter_mut().enumerate() {
        tracing::trace!("sequential {:?}: member {}, {} chunks", direction, member, plan.len());
        for chunk in plan {
            match direction {
                Direction::ToDevice => {
                    fleet.write_chunk(handle, member, symbol, chunk.offset, &buf[chunk.range()])?
                }
                Direction::FromDevice => {
                    let data = fleet.read_chunk(handle, member, symbol, chunk.offset, chunk.length)?;
                    if data.len() != chunk.length {
                        return Err(Error::Transfer(format!(
                            "member {} returned {} bytes for a {} byte chunk at {}",
                            member,
                            data.len(),
                            chunk.length,
                            chunk.offset
                        )));
                    }
                    buf[chunk.range()].copy_from_slice(&data);
                }
            }
        }
    }
    Ok(())
}

/// One batch per chunk, each holding every member's slice at that chunk
///
/// Runs before the timed region so that slice registration and its
/// allocations are not part of the batched samples.
fn register_batches<'b>(plan: &ChunkPlan, buffers: &'b mut [Vec<u8>]) -> Vec<TransferBatch<'b>> {
    let mut batches: Vec<TransferBatch<'b>> = plan
        .iter()
        .map(|_| TransferBatch::with_capacity(buffers.len()))
        .collect();

    for (member, buf) in buffers.iter_mut().enumerate() {
        let mut rest: &'b mut [u8] = &mut buf[..plan.total_size()];
        for (batch, chunk) in batches.iter_mut().zip(plan) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(chunk.length);
            batch.prepare(member, head);
            rest = tail;
        }
    }
    batches
}

fn batched(
    fleet: &mut dyn DeviceFleet,
    handle: &FleetHandle,
    direction: Direction,
    symbol: &str,
    plan: &ChunkPlan,
    batches: Vec<TransferBatch<'_>>,
) -> Result<()> {
    for (chunk, batch) in plan.iter().zip(batches) {
        tracing::trace!(
            "batched {:?}: chunk at {} ({} bytes) across {} members",
            direction,
            chunk.offset,
            chunk.length,
            batch.len()
        );
        fleet.push_collective(handle, direction, symbol, chunk.offset, chunk.length, batch)?;
    }
    Ok(())
}
