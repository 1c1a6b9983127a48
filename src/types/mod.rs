pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Accelerometer sensitivity at the default +/-2 g range.
pub const ACCEL_LSB_PER_G: f64 = 16384.0;

/// Gyroscope sensitivity at the default +/-250 deg/s range.
pub const GYRO_LSB_PER_DPS: f64 = 131.0;

/// One raw 6-axis reading in sensor counts (LSB), as delivered by the bus.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

impl RawSample {
    pub fn new(accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self { accel, gyro }
    }

    /// Build from the signed 16-bit registers the sensor reports.
    pub fn from_counts(accel: [i16; 3], gyro: [i16; 3]) -> Self {
        Self {
            accel: accel.map(f64::from),
            gyro: gyro.map(f64::from),
        }
    }

    pub fn accel_vec(&self) -> Vec3 {
        Vec3::new(self.accel[0], self.accel[1], self.accel[2])
    }

    pub fn gyro_vec(&self) -> Vec3 {
        Vec3::new(self.gyro[0], self.gyro[1], self.gyro[2])
    }
}
