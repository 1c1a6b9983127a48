//! Monotonic time sources.
//!
//! Every timestamp in the engine comes from a `Clock` so pulse timing and
//! filter steps can be driven deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed epoch.
    fn micros(&self) -> u64;

    /// Milliseconds since the same epoch.
    fn millis(&self) -> u64 {
        self.micros() / 1000
    }
}

/// Wall-independent clock backed by `Instant`. Readings start at 1 µs.
#[derive(Debug, Clone, Copy)]
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
    fn micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64 + 1
    }

    fn millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }
}

/// Hand-driven clock for tests and replayed scenarios.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn starting_at_ms(ms: u64) -> Self {
        Self {
            now_us: AtomicU64::new(ms * 1000),
        }
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1000);
    }
}

impl Clock for ManualClock {
    fn micros(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn micros(&self) -> u64 {
        (**self).micros()
    }

    fn millis(&self) -> u64 {
        (**self).millis()
    }
}
