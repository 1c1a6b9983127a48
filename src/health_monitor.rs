use log::{info, warn};
use serde::Serialize;

use crate::calibration::Calibration;
use crate::types::Vec3;

/// Outcome of sensor init plus calibration, logged once at startup.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StartupReport {
    pub sensor_present: bool,
    pub calibrated: bool,
    pub reference: Vec3,
    pub gyro_bias_dps: Vec3,
    pub samples_used: usize,
}

impl StartupReport {
    pub fn new(sensor_present: bool, calibration: Option<&Calibration>) -> Self {
        match calibration {
            Some(cal) => Self {
                sensor_present,
                calibrated: true,
                reference: cal.reference,
                gyro_bias_dps: cal.gyro_bias_dps,
                samples_used: cal.samples_used,
            },
            None => Self {
                sensor_present,
                calibrated: false,
                reference: crate::types::up(),
                gyro_bias_dps: Vec3::zeros(),
                samples_used: 0,
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.sensor_present && self.calibrated
    }

    /// One-line health string for the console
    pub fn format_status(&self) -> String {
        let sensor = if self.sensor_present { "✓" } else { "⚠ (absent)" };
        let calib = if self.calibrated {
            format!("✓ ({} samples)", self.samples_used)
        } else {
            "⚠ (defaults)".to_string()
        };
        format!(
            "Startup {}: IMU {} | Calibration {}",
            if self.is_healthy() { "HEALTHY" } else { "DEGRADED" },
            sensor,
            calib
        )
    }

    pub fn log(&self) {
        if self.is_healthy() {
            info!("[startup] {}", self.format_status());
        } else {
            warn!("[startup] {}", self.format_status());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_report() {
        let cal = Calibration {
            gyro_bias_dps: Vec3::new(0.1, 0.0, 0.0),
            reference: Vec3::new(0.0, 0.0, 1.0),
            samples_used: 200,
        };
        let report = StartupReport::new(true, Some(&cal));
        assert!(report.is_healthy());
        assert_eq!(
            report.format_status(),
            "Startup HEALTHY: IMU ✓ | Calibration ✓ (200 samples)"
        );
    }

    #[test]
    fn test_degraded_without_sensor() {
        let report = StartupReport::new(false, None);
        assert!(!report.is_healthy());
        assert_eq!(report.reference, crate::types::up());
        assert!(report.format_status().starts_with("Startup DEGRADED"));
        assert!(report.format_status().contains("IMU ⚠ (absent)"));
    }
}
