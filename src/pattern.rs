// src/pattern.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host-side buffers and the pattern written into them before each trial
//!
//! A pattern must reproduce the same bytes every time it is applied, so that
//! trials of one configuration are comparable. Seeded patterns derive one
//! Xoshiro256++ stream per device from `seed + device_index`.

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::PATTERN_BYTE;

/// Contents written across the host buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPattern {
    /// Every byte set to the given value
    Fill(u8),
    /// Xoshiro256++ keystream, reproducible for the same seed
    Seeded(u64),
}

impl HostPattern {
    /// Write the pattern for device `device_index` into `buf`
    pub fn apply(&self, device_index: usize, buf: &mut [u8]) {
        match *self {
            HostPattern::Fill(byte) => buf.fill(byte),
            HostPattern::Seeded(seed) => {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(device_index as u64));
                rng.fill_bytes(buf);
            }
        }
    }
}

impl Default for HostPattern {
    fn default() -> Self {
        HostPattern::Fill(PATTERN_BYTE)
    }
}

/// One host buffer per fleet member, exclusively owned for a configuration
#[derive(Debug, Clone)]
pub struct HostBuffers {
    buffers: Vec<Vec<u8>>,
    pattern: HostPattern,
}

impl HostBuffers {
    pub fn new(devices: usize, size: usize, pattern: HostPattern) -> Self {
        tracing::debug!(
            "Allocating {} host buffers of {} bytes ({:?})",
            devices,
            size,
            pattern
        );
        let mut host = Self {
            buffers: vec![vec![0u8; size]; devices],
            pattern,
        };
        host.reset();
        host
    }

    /// Re-apply the pattern to every buffer
    pub fn reset(&mut self) {
        for (i, buf) in self.buffers.iter_mut().enumerate() {
            self.pattern.apply(i, buf);
        }
    }

    /// Expected contents for device `device_index` before any transfer
    pub fn expected(&self, device_index: usize) -> Vec<u8> {
        let mut buf = vec![0u8; self.buffer_size()];
        self.pattern.apply(device_index, &mut buf);
        buf
    }

    pub fn device_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffers.first().map_or(0, Vec::len)
    }

    /// Bytes across all buffers
    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    pub fn as_slices(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    pub fn as_mut_slices(&mut self) -> &mut [Vec<u8>] {
        &mut self.buffers
    }
}

/// Fresh seed for a sweep that asked for a random pattern
///
/// Mixes the OS generator with wall-clock nanoseconds so two sweeps started
/// back to back on a host with a weak entropy pool still diverge. The value
/// is drawn once and then fixed for every trial of the sweep.
pub fn random_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    rand::rng().next_u64() ^ nanos.rotate_left(32)
}
