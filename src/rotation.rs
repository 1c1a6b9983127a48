//! Rotation pulse tracking.
//!
//! `RotationCounters` is the only state touched from the edge-input context.
//! It holds plain atomics and never takes a lock; every floating-point
//! derivation lives in `SpeedModel` and runs in task context.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::debug;

use crate::config::RotationConfig;

#[derive(Debug)]
pub struct RotationCounters {
    count: AtomicU64,
    last_pulse_us: AtomicU64,
    last_interval_us: AtomicU64,
    last_pulse_ms: AtomicU64,
    /// Set by the first counted pulse. Timestamps alone cannot say "none
    /// yet" because 0 is a valid clock reading.
    pulsed: AtomicBool,
    debounce_us: u64,
}

/// Values read from the counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseSnapshot {
    pub count: u64,
    pub last_interval_us: u64,
    pub last_pulse_ms: u64,
    pub pulsed: bool,
}

impl PulseSnapshot {
    pub fn has_pulse(&self) -> bool {
        self.pulsed
    }
}

impl RotationCounters {
    pub fn new(debounce_us: u64) -> Self {
        Self {
            count: AtomicU64::new(0),
            last_pulse_us: AtomicU64::new(0),
            last_interval_us: AtomicU64::new(0),
            last_pulse_ms: AtomicU64::new(0),
            pulsed: AtomicBool::new(false),
            debounce_us,
        }
    }

    /// Edge handler. Returns whether the pulse was counted.
    ///
    /// A pulse inside the debounce window of the previous *counted* pulse
    /// changes nothing. Assumes a single edge source, as with one interrupt line.
    pub fn on_pulse(&self, now_us: u64, now_ms: u64) -> bool {
        if self.pulsed.load(Ordering::Acquire) {
            let dt = now_us.wrapping_sub(self.last_pulse_us.load(Ordering::Relaxed));
            if dt < self.debounce_us {
                return false;
            }
            self.last_interval_us.store(dt, Ordering::Relaxed);
        }
        self.last_pulse_us.store(now_us, Ordering::Relaxed);
        self.last_pulse_ms.store(now_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.pulsed.store(true, Ordering::Release);
        true
    }

    pub fn snapshot(&self) -> PulseSnapshot {
        // Not atomic as a whole; a pulse landing mid-read can pair the new
        // count with the previous interval, which the next read corrects.
        let pulsed = self.pulsed.load(Ordering::Acquire);
        PulseSnapshot {
            count: self.count.load(Ordering::Relaxed),
            last_interval_us: self.last_interval_us.load(Ordering::Relaxed),
            last_pulse_ms: self.last_pulse_ms.load(Ordering::Relaxed),
            pulsed,
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Back to the boot state: no pulses, no interval.
    pub fn reset(&self) {
        self.pulsed.store(false, Ordering::Release);
        self.count.store(0, Ordering::Relaxed);
        self.last_interval_us.store(0, Ordering::Relaxed);
        self.last_pulse_ms.store(0, Ordering::Relaxed);
        self.last_pulse_us.store(0, Ordering::Relaxed);
        debug!("[rotation] counters reset");
    }
}

/// Converts pulse intervals into speed and distance (SI units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedModel {
    pub distance_per_pulse_m: f64,
    pub speed_scale: f64,
    pub speed_offset: f64,
    pub timeout_ms: u64,
}

impl SpeedModel {
    pub fn from_config(config: &RotationConfig) -> Self {
        Self {
            distance_per_pulse_m: config.distance_per_pulse_m(),
            speed_scale: config.speed_scale,
            speed_offset: config.speed_offset,
            timeout_ms: config.speed_timeout_ms,
        }
    }

    /// Speed in m/s for one inter-pulse interval. Zero interval means no
    /// measurement yet.
    pub fn speed_from_interval(&self, interval_us: u64) -> f64 {
        if interval_us == 0 {
            return 0.0;
        }
        let raw = self.distance_per_pulse_m * 1e6 / interval_us as f64;
        (raw * self.speed_scale + self.speed_offset).max(0.0)
    }

    /// True once a pulse has been seen and none followed within the timeout.
    pub fn is_stale(&self, snapshot: &PulseSnapshot, now_ms: u64) -> bool {
        snapshot.has_pulse() && now_ms.saturating_sub(snapshot.last_pulse_ms) > self.timeout_ms
    }

    pub fn distance_m(&self, count: u64) -> f64 {
        count as f64 * self.distance_per_pulse_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const T0_US: u64 = 1_000_000;

    fn pulse_at(counters: &RotationCounters, us: u64) -> bool {
        counters.on_pulse(us, us / 1000)
    }

    #[test]
    fn test_first_pulse_counts_without_interval() {
        let counters = RotationCounters::new(50_000);
        assert!(pulse_at(&counters, T0_US));
        let snap = counters.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.last_interval_us, 0);
        assert_eq!(snap.last_pulse_ms, 1000);
    }

    #[test]
    fn test_bounce_counts_once_with_short_window() {
        let counters = RotationCounters::new(5_000);
        assert!(pulse_at(&counters, T0_US));
        assert!(!pulse_at(&counters, T0_US + 3_000));
        assert_eq!(counters.count(), 1);
        assert_eq!(counters.snapshot().last_interval_us, 0);
    }

    #[test]
    fn test_bounce_counts_once_with_default_window() {
        let counters = RotationCounters::new(50_000);
        assert!(pulse_at(&counters, T0_US));
        assert!(!pulse_at(&counters, T0_US + 3_000));
        assert_eq!(counters.count(), 1);
    }

    #[test]
    fn test_spaced_pulses_record_interval() {
        let counters = RotationCounters::new(50_000);
        pulse_at(&counters, T0_US);
        pulse_at(&counters, T0_US + 60_000);
        let snap = counters.snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.last_interval_us, 60_000);
    }

    #[test]
    fn test_debounce_measured_from_last_counted_pulse() {
        let counters = RotationCounters::new(50_000);
        pulse_at(&counters, T0_US);
        // Rejected bounce at +30 ms must not move the window.
        assert!(!pulse_at(&counters, T0_US + 30_000));
        assert!(pulse_at(&counters, T0_US + 55_000));
        assert_eq!(counters.snapshot().last_interval_us, 55_000);
    }

    #[test]
    fn test_pulse_at_time_zero_is_a_real_pulse() {
        let counters = RotationCounters::new(50_000);
        assert!(counters.on_pulse(0, 0));
        assert!(counters.snapshot().has_pulse());

        assert!(counters.on_pulse(100_000, 100));
        let snap = counters.snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.last_interval_us, 100_000);
    }

    #[test]
    fn test_pulse_at_time_zero_goes_stale() {
        let counters = RotationCounters::new(50_000);
        counters.on_pulse(0, 0);
        let model = SpeedModel::from_config(&RotationConfig::default());
        assert!(model.is_stale(&counters.snapshot(), 60_000));
    }

    #[test]
    fn test_reset_clears_everything() {
        let counters = RotationCounters::new(50_000);
        pulse_at(&counters, T0_US);
        pulse_at(&counters, T0_US + 100_000);
        counters.reset();
        assert_eq!(counters.snapshot(), PulseSnapshot::default());
        // After reset the next pulse is a "first" pulse again.
        assert!(pulse_at(&counters, T0_US + 101_000));
        assert_eq!(counters.snapshot().last_interval_us, 0);
    }

    #[test]
    fn test_speed_from_interval() {
        let model = SpeedModel {
            distance_per_pulse_m: 0.25,
            speed_scale: 1.0,
            speed_offset: 0.0,
            timeout_ms: 2000,
        };
        assert_abs_diff_eq!(model.speed_from_interval(500_000), 0.5, epsilon = 1e-12);
        assert_eq!(model.speed_from_interval(0), 0.0);
    }

    #[test]
    fn test_speed_scale_offset_and_clamp() {
        let model = SpeedModel {
            distance_per_pulse_m: 0.25,
            speed_scale: 2.0,
            speed_offset: -0.1,
            timeout_ms: 2000,
        };
        assert_abs_diff_eq!(model.speed_from_interval(500_000), 0.9, epsilon = 1e-12);

        let negative = SpeedModel { speed_offset: -5.0, ..model };
        assert_eq!(negative.speed_from_interval(500_000), 0.0);
    }

    #[test]
    fn test_staleness_requires_a_pulse() {
        let model = SpeedModel::from_config(&RotationConfig::default());
        let never = PulseSnapshot::default();
        assert!(!model.is_stale(&never, 1_000_000));

        let snap = PulseSnapshot { count: 1, last_interval_us: 0, last_pulse_ms: 1000, pulsed: true };
        assert!(!model.is_stale(&snap, 3000));
        assert!(model.is_stale(&snap, 3001));
    }

    #[test]
    fn test_distance_from_count() {
        let model = SpeedModel::from_config(&RotationConfig::default());
        assert_abs_diff_eq!(
            model.distance_m(10),
            10.0 * std::f64::consts::PI * 0.0889,
            epsilon = 1e-9
        );
    }
}
