use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Snapshot handed to display and transport collaborators.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Readings {
    pub timestamp: f64,
    // Rotation
    pub rotations: u64,
    pub distance_m: f64,
    pub speed_mps: f64,
    pub max_speed_mps: f64,
    // Attitude
    pub angle_deg: f64,
    pub raw_angle_deg: f64,
    pub max_angle_deg: f64,
    pub min_angle_deg: f64,
    // Session
    pub session_active: bool,
    pub job: Option<String>,
}

impl Readings {
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Free-run display: stats while a job runs or the roller has turned,
    /// otherwise a ready prompt.
    pub fn display_line(&self) -> String {
        if !self.session_active && self.rotations == 0 {
            return format!("Ready | angle {:+.1}°", self.angle_deg);
        }
        let job = self.job.as_deref().unwrap_or("free run");
        format!(
            "{} | {:.2} m/s (max {:.2}) | {} rot {:.1} m | angle {:+.1}°",
            job,
            self.speed_mps,
            self.max_speed_mps,
            self.rotations,
            self.distance_m,
            self.angle_deg
        )
    }
}
