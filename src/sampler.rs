use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::calibration::{Calibration, Calibrator};
use crate::clock::Clock;
use crate::config::ReaderConfig;
use crate::error::{SensorError, SpeedReaderError};
use crate::filters::{AttitudeEstimator, AttitudeOutput};
use crate::sensors::SampleSource;
use crate::store::SharedStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub ticks: u64,
    pub published: u64,
    pub skipped_publishes: u64,
    pub read_failures: u64,
    pub degenerate_vectors: u64,
    pub clamped_dt: u64,
}

impl SamplerStats {
    pub fn format_status(&self) -> String {
        format!(
            "ticks={} published={} skipped={} read_failures={} degenerate={} clamped_dt={}",
            self.ticks,
            self.published,
            self.skipped_publishes,
            self.read_failures,
            self.degenerate_vectors,
            self.clamped_dt
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Published(AttitudeOutput),
    /// Store lock was busy; the output was computed but not published.
    PublishSkipped(AttitudeOutput),
    ReadFailed,
    SensorUnavailable,
}

/// Periodic attitude task: read, filter, publish.
///
/// Owns the estimator and the sensor, so calibration (which needs both
/// mutably) cannot overlap a tick.
pub struct AttitudeSampler<S, C> {
    estimator: AttitudeEstimator,
    source: S,
    clock: C,
    store: Arc<SharedStore>,
    calibrator: Calibrator,
    stats: SamplerStats,
    present: bool,
    unavailable_logged: bool,
    last_sample_us: Option<u64>,
}

impl<S: SampleSource, C: Clock> AttitudeSampler<S, C> {
    pub fn new(config: &ReaderConfig, mut source: S, clock: C, store: Arc<SharedStore>) -> Self {
        let present = source.is_present();
        let mut sampler = Self {
            estimator: AttitudeEstimator::new(&config.attitude),
            source,
            clock,
            store,
            calibrator: Calibrator::from_config(&config.calibration),
            stats: SamplerStats::default(),
            present,
            unavailable_logged: false,
            last_sample_us: None,
        };
        if present {
            info!("[sampler] sensor present");
        } else {
            sampler.log_unavailable();
        }
        sampler
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        if !self.present {
            return TickOutcome::SensorUnavailable;
        }

        let sample = match self.source.read_raw_sample() {
            Ok(sample) => sample,
            Err(SensorError::Unavailable(reason)) => {
                self.present = false;
                warn!("[sampler] sensor lost: {}", reason);
                self.unavailable_logged = true;
                return TickOutcome::SensorUnavailable;
            }
            Err(e) => {
                self.stats.read_failures += 1;
                debug!("[sampler] {}", e);
                return TickOutcome::ReadFailed;
            }
        };

        let now = self.clock.micros();
        let dt = match self.last_sample_us {
            Some(last) => now.saturating_sub(last) as f64 / 1e6,
            None => 0.0,
        };
        self.last_sample_us = Some(now);

        let output = self.estimator.update(&sample, dt);
        let diag = self.estimator.diagnostics();
        self.stats.degenerate_vectors = diag.degenerate_vectors;
        self.stats.clamped_dt = diag.clamped_dt;

        if self.store.try_publish(output) {
            self.stats.published += 1;
            TickOutcome::Published(output)
        } else {
            self.stats.skipped_publishes += 1;
            debug!("[sampler] store busy, publish skipped");
            TickOutcome::PublishSkipped(output)
        }
    }

    /// Run the calibration procedure with `sample_count` averaged samples.
    /// A no-op returning `Sensor(Unavailable)` when no sensor is present.
    pub fn calibrate(&mut self, sample_count: usize) -> crate::Result<Calibration> {
        if !self.present {
            self.log_unavailable();
            return Err(SpeedReaderError::Sensor(SensorError::Unavailable(
                "calibration requested without a sensor".to_string(),
            )));
        }
        let calibrator = self.calibrator.clone().with_samples(sample_count);
        let calibration = calibrator.run(&mut self.estimator, &mut self.source)?;
        // Fresh dt baseline after the blocking pass.
        self.last_sample_us = None;
        Ok(calibration)
    }

    /// Calibrate with the configured sample count.
    pub fn calibrate_default(&mut self) -> crate::Result<Calibration> {
        let n = self.calibrator.samples;
        self.calibrate(n)
    }

    /// Probe the sensor again. Returns whether it is now present.
    pub fn reinit(&mut self) -> bool {
        self.present = self.source.is_present();
        self.unavailable_logged = false;
        self.last_sample_us = None;
        if self.present {
            info!("[sampler] sensor reinitialized");
        } else {
            self.log_unavailable();
        }
        self.present
    }

    fn log_unavailable(&mut self) {
        if !self.unavailable_logged {
            warn!("[sampler] sensor unavailable, attitude frozen until reinit");
            self.unavailable_logged = true;
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    pub fn estimator(&self) -> &AttitudeEstimator {
        &self.estimator
    }

    /// Tick every `period` until `stop` flips to true, then hand the sampler
    /// back so the caller can report its stats.
    pub async fn run_until(mut self, period: Duration, mut stop: watch::Receiver<bool>) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                    if self.stats.ticks % 500 == 0 {
                        debug!("[sampler] {}", self.stats.format_status());
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        self
    }
}
