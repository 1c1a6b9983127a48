//! Reader-facing API over the shared store and the rotation counters.
//!
//! Display and transport collaborators hold a cloned `Monitor`. Every call
//! copies values out; nothing borrowed from the store escapes.

use std::sync::Arc;

use log::info;

use crate::clock::Clock;
use crate::live_status::Readings;
use crate::rotation::{RotationCounters, SpeedModel};
use crate::session::{JobLabel, SessionInfo};
use crate::store::SharedStore;

#[derive(Clone)]
pub struct Monitor {
    store: Arc<SharedStore>,
    counters: Arc<RotationCounters>,
    model: SpeedModel,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    pub fn new(
        store: Arc<SharedStore>,
        counters: Arc<RotationCounters>,
        model: SpeedModel,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            counters,
            model,
            clock,
        }
    }

    pub fn current_angle(&self) -> f64 {
        self.store.with(|d| d.angle_deg)
    }

    pub fn raw_angle(&self) -> f64 {
        self.store.with(|d| d.raw_angle_deg)
    }

    /// Speed from the latest pulse interval, in m/s.
    ///
    /// Reads 0 once no pulse has arrived within the timeout, and ends an
    /// active session as a side effect. Raises the recorded max speed.
    pub fn current_speed(&self) -> f64 {
        let snap = self.counters.snapshot();
        if self.model.is_stale(&snap, self.clock.millis()) {
            if self.store.with(|d| d.session.timeout()) {
                info!("[session] ended by rotation timeout");
            }
            return 0.0;
        }

        let speed = self.model.speed_from_interval(snap.last_interval_us);
        if speed > 0.0 {
            self.store.with(|d| d.note_speed(speed));
        }
        speed
    }

    pub fn max_speed(&self) -> f64 {
        self.store.with(|d| d.max_speed_mps)
    }

    pub fn rotation_count(&self) -> u64 {
        self.counters.count()
    }

    pub fn total_distance(&self) -> f64 {
        self.model.distance_m(self.counters.count())
    }

    /// (max, min) published angle since the last reset. Before any publish
    /// these are the -180/180 sentinels.
    pub fn angle_extrema(&self) -> (f64, f64) {
        self.store.with(|d| (d.max_angle_deg, d.min_angle_deg))
    }

    pub fn session_info(&self) -> SessionInfo {
        self.store.with(|d| d.session.info())
    }

    /// Reset everything, then start timing `job`. Starting again with an
    /// active session resets and relabels it.
    pub fn start_session(&self, job: &str) -> crate::Result<()> {
        let label = JobLabel::new(job)?;
        self.counters.reset();
        self.store.with(|d| {
            d.reset_extrema();
            d.session.start(label);
        });
        info!("[session] started job '{}'", job.trim());
        Ok(())
    }

    pub fn stop_session(&self) {
        let was_active = self.store.with(|d| {
            let active = d.session.is_active();
            d.session.stop();
            active
        });
        if was_active {
            info!("[session] stopped");
        }
    }

    /// Zero rotations, max speed and angle extrema. The session is untouched.
    pub fn reset_counters(&self) {
        self.counters.reset();
        self.store.with(|d| d.reset_extrema());
    }

    /// One consistent status snapshot for display and transport.
    pub fn readings(&self) -> Readings {
        // Speed first: a timeout must be reflected in the session fields.
        let speed = self.current_speed();
        let rotations = self.counters.count();
        let data = self.store.snapshot();
        Readings {
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            rotations,
            distance_m: self.model.distance_m(rotations),
            speed_mps: speed,
            max_speed_mps: data.max_speed_mps,
            angle_deg: data.angle_deg,
            raw_angle_deg: data.raw_angle_deg,
            max_angle_deg: data.max_angle_deg,
            min_angle_deg: data.min_angle_deg,
            session_active: data.session.is_active(),
            job: data.session.job().map(|j| j.to_string()),
        }
    }
}
