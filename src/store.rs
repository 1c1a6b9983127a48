//! Shared state behind a single mutex.
//!
//! The sampler publishes with `try_lock` and skips the tick when the lock is
//! busy; readers block briefly and copy values out. Nothing borrowed from the
//! locked data escapes a `with` closure.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use log::warn;

use crate::filters::AttitudeOutput;
use crate::session::SessionStateMachine;

/// Extremum sentinels: the first published angle replaces both.
pub const MAX_ANGLE_INIT: f64 = -180.0;
pub const MIN_ANGLE_INIT: f64 = 180.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreData {
    pub angle_deg: f64,
    pub raw_angle_deg: f64,
    pub max_angle_deg: f64,
    pub min_angle_deg: f64,
    pub max_speed_mps: f64,
    pub session: SessionStateMachine,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            angle_deg: 0.0,
            raw_angle_deg: 0.0,
            max_angle_deg: MAX_ANGLE_INIT,
            min_angle_deg: MIN_ANGLE_INIT,
            max_speed_mps: 0.0,
            session: SessionStateMachine::new(),
        }
    }
}

impl StoreData {
    /// Record a filter output and widen the angle extrema.
    pub fn publish(&mut self, output: AttitudeOutput) {
        self.angle_deg = output.angle_deg;
        self.raw_angle_deg = output.raw_angle_deg;
        if output.angle_deg > self.max_angle_deg {
            self.max_angle_deg = output.angle_deg;
        }
        if output.angle_deg < self.min_angle_deg {
            self.min_angle_deg = output.angle_deg;
        }
    }

    pub fn note_speed(&mut self, speed_mps: f64) {
        if speed_mps > self.max_speed_mps {
            self.max_speed_mps = speed_mps;
        }
    }

    /// Clear max speed and angle extrema. Current angle and session untouched.
    pub fn reset_extrema(&mut self) {
        self.max_angle_deg = MAX_ANGLE_INIT;
        self.min_angle_deg = MIN_ANGLE_INIT;
        self.max_speed_mps = 0.0;
    }
}

#[derive(Debug, Default)]
pub struct SharedStore {
    inner: Mutex<StoreData>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking publish for the sampler. Returns false when the lock is
    /// held elsewhere; the caller skips this tick.
    pub fn try_publish(&self, output: AttitudeOutput) -> bool {
        let mut guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return false,
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("[store] lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.publish(output);
        true
    }

    /// Blocking access for readers and task-context writers.
    pub fn with<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Copy of everything in the store.
    pub fn snapshot(&self) -> StoreData {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the lock for the lifetime of the guard. Lets tests provoke the
    /// busy-lock path deterministically.
    #[cfg(test)]
    pub(crate) fn hold(&self) -> MutexGuard<'_, StoreData> {
        self.lock()
    }
}
