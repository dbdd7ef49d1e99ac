// src/clock.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monotonic timestamps with nanosecond resolution
//!
//! Timestamps are (seconds, nanoseconds) pairs measured from the clock's
//! creation, so they are immune to wall-clock adjustments.

use std::time::Instant;

use crate::constants::NS_PER_SEC;
use crate::stats::DurationSample;

/// A point on the monotonic timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }
}

/// Monotonic clock anchored at construction
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Capture the current timestamp
    #[inline]
    pub fn now(&self) -> Timestamp {
        let since = self.origin.elapsed();
        Timestamp {
            secs: since.as_secs(),
            nanos: since.subsec_nanos(),
        }
    }

    /// Nanoseconds from `start` to `end`
    ///
    /// When `end`'s sub-second part is smaller than `start`'s, one whole second
    /// is borrowed. An `end` earlier than `start` yields 0.
    #[inline]
    pub fn elapsed(start: Timestamp, end: Timestamp) -> DurationSample {
        let (secs, nanos) = if end.nanos < start.nanos {
            (
                end.secs as i64 - start.secs as i64 - 1,
                NS_PER_SEC + end.nanos as i64 - start.nanos as i64,
            )
        } else {
            (
                end.secs as i64 - start.secs as i64,
                end.nanos as i64 - start.nanos as i64,
            )
        };
        (secs * NS_PER_SEC + nanos).max(0)
    }

    /// Time `f`, returning its output and the elapsed nanoseconds
    #[inline]
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> (T, DurationSample) {
        let start = self.now();
        let out = f();
        let end = self.now();
        (out, Self::elapsed(start, end))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_same_second() {
        let start = Timestamp::new(3, 100);
        let end = Timestamp::new(3, 600);
        assert_eq!(Clock::elapsed(start, end), 500);
    }

    #[test]
    fn test_elapsed_borrows_a_second() {
        let start = Timestamp::new(1, 900_000_000);
        let end = Timestamp::new(2, 100_000_000);
        assert_eq!(Clock::elapsed(start, end), 200_000_000);
    }

    #[test]
    fn test_elapsed_multiple_seconds_with_rollover() {
        let start = Timestamp::new(10, 999_999_999);
        let end = Timestamp::new(13, 1);
        assert_eq!(Clock::elapsed(start, end), 2 * NS_PER_SEC + 2);
    }

    #[test]
    fn test_elapsed_zero_and_reversed() {
        let t = Timestamp::new(5, 5);
        assert_eq!(Clock::elapsed(t, t), 0);
        assert_eq!(Clock::elapsed(Timestamp::new(6, 0), t), 0);
    }

    #[test]
    fn test_now_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(Clock::elapsed(a, b) >= 0);
    }

    #[test]
    fn test_measure_spans_closure() {
        let clock = Clock::new();
        let (value, ns) = clock.measure(|| {
            std::thread::sleep(std::time::Duration::from_millis(2));
            7
        });
        assert_eq!(value, 7);
        assert!(ns >= 2_000_000, "measured {} ns", ns);
    }
}
