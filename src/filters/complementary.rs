use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::AttitudeConfig;
use crate::types::{angle_between_deg, try_normalize, up, RawSample, Vec3};

/// Angles published after one filter step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeOutput {
    /// Offset, smoothed and dead-banded tilt (deg).
    pub angle_deg: f64,
    /// Tilt of the accelerometer direction alone (deg), for diagnostics.
    pub raw_angle_deg: f64,
}

/// Counters for the non-fatal conditions the filter absorbs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EstimatorDiagnostics {
    pub updates: u64,
    pub degenerate_vectors: u64,
    pub clamped_dt: u64,
}

/// Gravity-direction complementary filter.
///
/// Tracks the unit direction of measured specific force in the sensor frame,
/// which points up (+Z for a level sensor). Gyro integration is
/// smooth but drifts; the accelerometer is drift-free but noisy. Each step
/// predicts with the gyro and pulls the prediction toward the measured
/// direction by `1 - alpha`. Tilt is the angle between the estimate and the
/// calibrated reference.
#[derive(Clone, Debug)]
pub struct AttitudeEstimator {
    // Filter state
    estimate: Vec3,
    measured: Vec3,
    reference: Vec3,
    gyro_bias_dps: Vec3,
    smoothed_deg: f64,

    // Gains
    alpha: f64,
    beta: f64,
    deadband_deg: f64,
    angle_offset_deg: f64,
    max_dt: f64,
    accel_lsb_per_g: f64,
    gyro_lsb_per_dps: f64,

    diagnostics: EstimatorDiagnostics,
}

impl AttitudeEstimator {
    pub fn new(config: &AttitudeConfig) -> Self {
        Self {
            estimate: up(),
            measured: up(),
            reference: up(),
            gyro_bias_dps: Vec3::zeros(),
            smoothed_deg: 0.0,
            alpha: config.fusion_alpha,
            beta: config.smoothing_beta,
            deadband_deg: config.deadband_deg,
            angle_offset_deg: config.angle_offset_deg,
            max_dt: config.max_dt_secs,
            accel_lsb_per_g: config.accel_lsb_per_g,
            gyro_lsb_per_dps: config.gyro_lsb_per_dps,
            diagnostics: EstimatorDiagnostics::default(),
        }
    }

    pub fn update(&mut self, sample: &RawSample, dt: f64) -> AttitudeOutput {
        self.diagnostics.updates += 1;

        let dt = if dt <= 0.0 || dt > self.max_dt || !dt.is_finite() {
            self.diagnostics.clamped_dt += 1;
            debug!("[attitude] dt {:.4}s out of range, integrating with 0", dt);
            0.0
        } else {
            dt
        };

        // Scaling by the sensitivity does not change the direction, but keeps
        // the degenerate threshold meaningful in g rather than counts.
        match try_normalize(&(sample.accel_vec() / self.accel_lsb_per_g)) {
            Some(m) => self.measured = m,
            None => self.note_degenerate("accelerometer"),
        }

        let omega = (sample.gyro_vec() / self.gyro_lsb_per_dps - self.gyro_bias_dps)
            .map(f64::to_radians);

        let predicted = match try_normalize(&(self.estimate + self.estimate.cross(&omega) * dt)) {
            Some(p) => p,
            None => {
                self.note_degenerate("prediction");
                self.estimate
            }
        };

        let fused = predicted * self.alpha + self.measured * (1.0 - self.alpha);
        match try_normalize(&fused) {
            Some(f) => self.estimate = f,
            None => {
                self.note_degenerate("fusion");
                self.estimate = predicted;
            }
        }

        let angle = angle_between_deg(&self.estimate, &self.reference) + self.angle_offset_deg;
        let raw_angle = angle_between_deg(&self.measured, &self.reference);

        self.smoothed_deg = self.smoothed_deg * (1.0 - self.beta) + angle * self.beta;

        AttitudeOutput {
            angle_deg: apply_deadband(self.smoothed_deg, self.deadband_deg),
            raw_angle_deg: raw_angle,
        }
    }

    fn note_degenerate(&mut self, which: &str) {
        self.diagnostics.degenerate_vectors += 1;
        debug!("[attitude] degenerate {} vector, keeping previous", which);
    }

    /// Install a calibrated reference. The estimate and last measurement snap
    /// to it and the smoothed angle restarts from zero.
    pub fn set_reference(&mut self, reference: Vec3) {
        let reference = try_normalize(&reference).unwrap_or_else(up);
        self.reference = reference;
        self.estimate = reference;
        self.measured = reference;
        self.smoothed_deg = 0.0;
    }

    pub fn set_gyro_bias_dps(&mut self, bias: Vec3) {
        self.gyro_bias_dps = bias;
    }

    pub fn estimate(&self) -> Vec3 {
        self.estimate
    }

    pub fn reference(&self) -> Vec3 {
        self.reference
    }

    pub fn gyro_bias_dps(&self) -> Vec3 {
        self.gyro_bias_dps
    }

    pub fn gyro_lsb_per_dps(&self) -> f64 {
        self.gyro_lsb_per_dps
    }

    pub fn diagnostics(&self) -> EstimatorDiagnostics {
        self.diagnostics
    }
}

/// Symmetric dead zone: magnitudes below `band` read as exactly 0.
pub fn apply_deadband(angle_deg: f64, band: f64) -> f64 {
    if angle_deg.abs() < band {
        0.0
    } else {
        angle_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const G: f64 = 16384.0;

    fn level() -> RawSample {
        RawSample::new([0.0, 0.0, G], [0.0; 3])
    }

    fn tilted(deg: f64) -> RawSample {
        let r = deg.to_radians();
        RawSample::new([G * r.sin(), 0.0, G * r.cos()], [0.0; 3])
    }

    #[test]
    fn test_deadband_boundary() {
        assert_eq!(apply_deadband(0.15, 0.2), 0.0);
        assert_eq!(apply_deadband(-0.15, 0.2), 0.0);
        assert_eq!(apply_deadband(0.25, 0.2), 0.25);
        assert_eq!(apply_deadband(-0.25, 0.2), -0.25);
        assert_eq!(apply_deadband(0.2, 0.2), 0.2);
    }

    #[test]
    fn test_level_reads_zero() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        for _ in 0..50 {
            let out = est.update(&level(), 0.02);
            assert_eq!(out.angle_deg, 0.0);
        }
        assert_abs_diff_eq!(est.estimate().norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_converges_to_static_tilt() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        let mut out = AttitudeOutput::default();
        for _ in 0..3000 {
            out = est.update(&tilted(10.0), 0.02);
        }
        assert_abs_diff_eq!(out.angle_deg, 10.0, epsilon = 0.05);
        assert_abs_diff_eq!(out.raw_angle_deg, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unit_vector_invariant() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        for i in 0..500 {
            let wobble = (i as f64 * 0.1).sin();
            let sample = RawSample::new(
                [900.0 * wobble, -300.0, G + 200.0 * wobble],
                [40.0 * wobble, -25.0, 130.0],
            );
            est.update(&sample, 0.02);
            assert!((est.estimate().norm() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zero_accel_keeps_previous_direction() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        est.update(&tilted(20.0), 0.02);
        let before = est.estimate();

        let out = est.update(&RawSample::new([0.0; 3], [0.0; 3]), 0.02);
        assert!(!out.angle_deg.is_nan());
        assert!(!out.raw_angle_deg.is_nan());
        assert_eq!(est.diagnostics().degenerate_vectors, 1);
        assert_abs_diff_eq!(est.estimate().norm(), 1.0, epsilon = 1e-9);
        // Measured direction was reused, so the estimate kept pulling the same way.
        assert!(est.estimate().x >= before.x);
    }

    #[test]
    fn test_bad_dt_skips_gyro_integration() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        // Fast roll, but dt is nonsense: only the (level) accel is fused.
        let spinning = RawSample::new([0.0, 0.0, G], [131.0 * 200.0, 0.0, 0.0]);
        for dt in [0.0, -0.5, 2.5, f64::NAN] {
            est.update(&spinning, dt);
        }
        assert_eq!(est.diagnostics().clamped_dt, 4);
        assert_abs_diff_eq!(est.estimate().z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gyro_bias_is_removed() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        est.set_gyro_bias_dps(Vec3::new(5.0, 0.0, 0.0));
        // Raw gyro equal to the bias: no rotation at all.
        let biased = RawSample::new([0.0, 0.0, G], [5.0 * 131.0, 0.0, 0.0]);
        for _ in 0..100 {
            est.update(&biased, 0.02);
        }
        assert_abs_diff_eq!(est.estimate().z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_is_relative_to_reference() {
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        let r = 10f64.to_radians();
        est.set_reference(Vec3::new(r.sin(), 0.0, r.cos()));
        let out = est.update(&tilted(10.0), 0.02);
        assert_eq!(out.angle_deg, 0.0);
        assert_abs_diff_eq!(out.raw_angle_deg, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_offset_applies_before_smoothing() {
        let config = AttitudeConfig {
            angle_offset_deg: 2.0,
            smoothing_beta: 1.0,
            ..AttitudeConfig::default()
        };
        let mut est = AttitudeEstimator::new(&config);
        let out = est.update(&level(), 0.02);
        assert_abs_diff_eq!(out.angle_deg, 2.0, epsilon = 1e-9);
    }
}
