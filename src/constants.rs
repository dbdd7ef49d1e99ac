// src/constants.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Largest payload a single host/device transfer call accepts (2 KiB)
/// This is imposed by the device memory API and is not runtime-configurable
pub const MAX_CHUNK_SIZE: usize = 2048;

/// Trials per configuration
pub const NUM_ITERATIONS: usize = 20;

/// Byte written across every host buffer before each trial
pub const PATTERN_BYTE: u8 = 0xA5;

/// Symbol name of the shared device-side buffer
pub const DEFAULT_SYMBOL: &str = "mram_buffer";

/// Capacity of the swap program's device buffer (64 KiB)
pub const SWAP_BUFFER_CAPACITY: usize = 65536;

/// Capacity of the prototype program's device buffer, one chunk
pub const PROTO_BUFFER_CAPACITY: usize = 2048;

/// Per-device memory; no declared symbol may exceed it (64 MiB)
pub const DEVICE_MEMORY_SIZE: usize = 64 * 1024 * 1024;

/// Highest worker (tasklet) count a device can run
pub const MAX_WORKERS: usize = 24;

/// Devices the software simulator can hand out at once
pub const SIMULATOR_POOL_SIZE: usize = 64;

pub const NS_PER_SEC: i64 = 1_000_000_000;

/// Bytes per MB as used in throughput figures (MiB)
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default sweep axes
pub const DEFAULT_DEVICE_COUNTS: [usize; 5] = [1, 8, 16, 32, 64];
pub const DEFAULT_WORKER_COUNTS: [usize; 4] = [1, 4, 8, 16];
pub const DEFAULT_BUFFER_SIZES: [usize; 5] = [512, 1024, 2048, 4096, 8192];

/// Default report file
pub const DEFAULT_OUTPUT_PATH: &str = "benchmark_results.csv";
