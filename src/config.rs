use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub attitude: AttitudeConfig,
    pub calibration: CalibrationConfig,
    pub rotation: RotationConfig,
    pub tasks: TaskConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttitudeConfig {
    // ── Complementary filter ──
    /// Weight of the gyro-integrated prediction (accel gets 1 - alpha).
    pub fusion_alpha: f64,
    /// Steps with dt above this (seconds) are treated as dt = 0.
    pub max_dt_secs: f64,

    // ── Output shaping ──
    pub smoothing_beta: f64,
    pub deadband_deg: f64,
    pub angle_offset_deg: f64,

    // ── Sensor sensitivity ──
    pub accel_lsb_per_g: f64,
    pub gyro_lsb_per_dps: f64,
}

impl Default for AttitudeConfig {
    fn default() -> Self {
        Self {
            fusion_alpha: 0.99,
            max_dt_secs: 1.0,
            smoothing_beta: 0.1,
            deadband_deg: 0.2,
            angle_offset_deg: 0.0,
            accel_lsb_per_g: ACCEL_LSB_PER_G,
            gyro_lsb_per_dps: GYRO_LSB_PER_DPS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub warmup_samples: usize,
    pub samples: usize,
    /// Pause between calibration reads.
    pub pause_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            warmup_samples: 100,
            samples: 200,
            pause_ms: 5,
        }
    }
}

impl CalibrationConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Minimum spacing between counted pulses. 50 ms by default; 5 ms allows
    /// much higher roller speeds but lets contact bounce through.
    pub debounce_us: u64,
    pub speed_timeout_ms: u64,

    // ── Geometry ──
    pub wheel_diameter_m: f64,
    pub pulses_per_rotation: u32,
    pub distance_offset_m: f64,

    // ── Speed calibration ──
    pub speed_scale: f64,
    pub speed_offset: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            debounce_us: 50_000,
            speed_timeout_ms: 2_000,
            wheel_diameter_m: 0.0889, // 3.5 in roller
            pulses_per_rotation: 1,
            distance_offset_m: 0.0,
            speed_scale: 1.0,
            speed_offset: 0.0,
        }
    }
}

impl RotationConfig {
    /// Distance covered between two pulses, in metres.
    pub fn distance_per_pulse_m(&self) -> f64 {
        PI * self.wheel_diameter_m / f64::from(self.pulses_per_rotation.max(1))
            + self.distance_offset_m
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub sample_interval_ms: u64,
    pub display_interval_ms: u64,
    pub status_interval_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 20,
            display_interval_ms: 500,
            status_interval_secs: 2,
        }
    }
}

impl ReaderConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.attitude;
        unit_range("attitude.fusion_alpha", a.fusion_alpha)?;
        unit_range("attitude.smoothing_beta", a.smoothing_beta)?;
        positive("attitude.max_dt_secs", a.max_dt_secs)?;
        positive("attitude.accel_lsb_per_g", a.accel_lsb_per_g)?;
        positive("attitude.gyro_lsb_per_dps", a.gyro_lsb_per_dps)?;
        if a.deadband_deg < 0.0 || a.deadband_deg.is_nan() {
            return Err(ConfigError::NotPositive {
                field: "attitude.deadband_deg",
                value: a.deadband_deg,
            });
        }

        let r = &self.rotation;
        if r.debounce_us == 0 {
            return Err(ConfigError::Zero("rotation.debounce_us"));
        }
        if r.speed_timeout_ms == 0 {
            return Err(ConfigError::Zero("rotation.speed_timeout_ms"));
        }
        if r.pulses_per_rotation == 0 {
            return Err(ConfigError::Zero("rotation.pulses_per_rotation"));
        }
        positive("rotation.wheel_diameter_m", r.wheel_diameter_m)?;
        positive("rotation.distance_per_pulse_m", r.distance_per_pulse_m())?;

        let t = &self.tasks;
        if t.sample_interval_ms == 0 {
            return Err(ConfigError::Zero("tasks.sample_interval_ms"));
        }
        if t.display_interval_ms == 0 {
            return Err(ConfigError::Zero("tasks.display_interval_ms"));
        }
        if t.status_interval_secs == 0 {
            return Err(ConfigError::Zero("tasks.status_interval_secs"));
        }
        Ok(())
    }
}

fn unit_range(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}
