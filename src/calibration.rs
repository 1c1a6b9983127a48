use std::thread;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use crate::config::CalibrationConfig;
use crate::error::SensorError;
use crate::filters::AttitudeEstimator;
use crate::sensors::SampleSource;
use crate::types::{try_normalize, up, RawSample, Vec3};

/// Result of one calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub gyro_bias_dps: Vec3,
    pub reference: Vec3,
    pub samples_used: usize,
}

/// Average a batch of stationary samples into a bias and reference.
///
/// Returns `None` for an empty batch. A mean accelerometer vector of zero
/// length falls back to "up".
pub fn compute_calibration(samples: &[RawSample], gyro_lsb_per_dps: f64) -> Option<Calibration> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;

    let (accel_sum, gyro_sum) = samples.iter().fold(
        (Vec3::zeros(), Vec3::zeros()),
        |(a, g), s| (a + s.accel_vec(), g + s.gyro_vec()),
    );

    let reference = try_normalize(&(accel_sum / n)).unwrap_or_else(|| {
        warn!("[calib] mean accelerometer vector is zero, using +Z as reference");
        up()
    });

    Some(Calibration {
        gyro_bias_dps: gyro_sum / n / gyro_lsb_per_dps,
        reference,
        samples_used: samples.len(),
    })
}

/// Two-phase startup calibration: warm the filter up, then average a batch of
/// raw samples with the platform held still.
#[derive(Debug, Clone)]
pub struct Calibrator {
    pub warmup_samples: usize,
    pub samples: usize,
    pub pause: Duration,
}

impl Calibrator {
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            warmup_samples: config.warmup_samples,
            samples: config.samples,
            pause: config.pause(),
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Blocking. Must not overlap normal sampling on the same estimator.
    pub fn run<S: SampleSource + ?Sized>(
        &self,
        estimator: &mut AttitudeEstimator,
        source: &mut S,
    ) -> Result<Calibration, SensorError> {
        if !source.is_present() {
            warn!("[calib] sensor unavailable, calibration skipped");
            return Err(SensorError::Unavailable(
                "sensor not present at calibration".to_string(),
            ));
        }

        info!(
            "[calib] warm-up {} samples, then averaging {}",
            self.warmup_samples, self.samples
        );
        let dt = self.pause.as_secs_f64();
        for _ in 0..self.warmup_samples {
            if let Ok(sample) = source.read_raw_sample() {
                estimator.update(&sample, dt);
            }
            self.wait();
        }

        let mut batch = Vec::with_capacity(self.samples);
        let mut failures = 0usize;
        for _ in 0..self.samples {
            match source.read_raw_sample() {
                Ok(sample) => batch.push(sample),
                Err(_) => failures += 1,
            }
            self.wait();
        }
        if failures > 0 {
            warn!("[calib] {} of {} reads failed", failures, self.samples);
        }

        let calibration = compute_calibration(&batch, estimator.gyro_lsb_per_dps())
            .ok_or_else(|| SensorError::TransientRead("no calibration samples read".to_string()))?;

        estimator.set_gyro_bias_dps(calibration.gyro_bias_dps);
        estimator.set_reference(calibration.reference);

        let r = calibration.reference;
        let b = calibration.gyro_bias_dps;
        info!(
            "[calib] reference [{:.4}, {:.4}, {:.4}], gyro bias [{:.3}, {:.3}, {:.3}] deg/s ({} samples)",
            r.x, r.y, r.z, b.x, b.y, b.z, calibration.samples_used
        );
        Ok(calibration)
    }

    fn wait(&self) {
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttitudeConfig;
    use crate::sensors::ScriptedImu;
    use approx::assert_abs_diff_eq;

    fn quick(samples: usize) -> Calibrator {
        Calibrator {
            warmup_samples: 5,
            samples,
            pause: Duration::ZERO,
        }
    }

    #[test]
    fn test_constant_level_input() {
        let samples = vec![RawSample::new([0.0, 0.0, 16384.0], [0.0; 3]); 20];
        let cal = compute_calibration(&samples, 131.0).unwrap();
        assert_abs_diff_eq!(cal.reference, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_abs_diff_eq!(cal.gyro_bias_dps, Vec3::zeros(), epsilon = 1e-12);
        assert_eq!(cal.samples_used, 20);
    }

    #[test]
    fn test_gyro_bias_in_dps() {
        let samples = [
            RawSample::new([0.0, 0.0, 16384.0], [131.0, -262.0, 0.0]),
            RawSample::new([0.0, 0.0, 16384.0], [393.0, -262.0, 0.0]),
        ];
        let cal = compute_calibration(&samples, 131.0).unwrap();
        assert_abs_diff_eq!(cal.gyro_bias_dps, Vec3::new(2.0, -2.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_mean_falls_back_to_up() {
        let samples = [
            RawSample::new([0.0, 0.0, 100.0], [0.0; 3]),
            RawSample::new([0.0, 0.0, -100.0], [0.0; 3]),
        ];
        let cal = compute_calibration(&samples, 131.0).unwrap();
        assert_eq!(cal.reference, up());
    }

    #[test]
    fn test_empty_batch() {
        assert!(compute_calibration(&[], 131.0).is_none());
    }

    #[test]
    fn test_run_applies_to_estimator() {
        let tilt = RawSample::new([0.0, 16384.0, 0.0], [13.1, 0.0, 0.0]);
        let mut imu = ScriptedImu::constant(tilt);
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());

        let cal = quick(10).run(&mut est, &mut imu).unwrap();
        assert_abs_diff_eq!(cal.reference, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_eq!(est.reference(), cal.reference);
        assert_eq!(est.estimate(), cal.reference);
        assert_abs_diff_eq!(est.gyro_bias_dps().x, 0.1, epsilon = 1e-12);
        assert_eq!(imu.reads(), 15);
    }

    #[test]
    fn test_failed_reads_are_skipped() {
        let level = RawSample::new([0.0, 0.0, 16384.0], [262.0, 0.0, 0.0]);
        let nack = || Err(SensorError::TransientRead("nack".into()));
        let mut script: Vec<Result<RawSample, SensorError>> = vec![Ok(level); 5];
        script.extend([Ok(level), nack(), Ok(level), nack()]);
        let mut imu = ScriptedImu::new(script);
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());

        // The last scripted entry (a failure) repeats after the script ends.
        let cal = quick(6).run(&mut est, &mut imu).unwrap();
        assert_eq!(cal.samples_used, 2);
        // Mean over successful reads only: 262 / 131 = 2 deg/s.
        assert_abs_diff_eq!(cal.gyro_bias_dps.x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unavailable_sensor_is_noop() {
        let mut imu = ScriptedImu::absent();
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        let err = quick(10).run(&mut est, &mut imu).unwrap_err();
        assert!(matches!(err, SensorError::Unavailable(_)));
        assert_eq!(imu.reads(), 0);
        assert_eq!(est.reference(), up());
        assert_eq!(est.diagnostics().updates, 0);
    }

    #[test]
    fn test_no_successful_reads_leaves_estimator() {
        let mut imu = ScriptedImu::new([Err(SensorError::TransientRead("bus".into()))]);
        let mut est = AttitudeEstimator::new(&AttitudeConfig::default());
        let result = quick(4).run(&mut est, &mut imu);
        assert!(matches!(result, Err(SensorError::TransientRead(_))));
        assert_eq!(est.reference(), up());
        assert_eq!(est.gyro_bias_dps(), Vec3::zeros());
    }
}
