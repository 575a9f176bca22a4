//! Monotonic millisecond clock with a test-injectable seam.
//!
//! Every time-based threshold in the host (idle timeout, keepalive cadence,
//! FFB staleness, latch windows) is expressed as a duration in milliseconds
//! against this clock, never as a tick count, so a slower loop degrades
//! gracefully instead of shifting semantics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since the clock's epoch. Monotone non-decreasing.
    fn now_ms(&self) -> u64;
}

/// Production clock: epoch fixed at construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis().min(u64::MAX as u128) as u64
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(start_ms),
        }
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time. Panics if it would move backwards.
    pub fn set(&self, now_ms: u64) {
        let prev = self.ms.swap(now_ms, Ordering::SeqCst);
        assert!(now_ms >= prev, "ManualClock moved backwards");
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// Shared clock handle used throughout the host.
pub type SharedClock = Arc<dyn Clock>;
