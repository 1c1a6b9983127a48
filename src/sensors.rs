use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info};
use tokio::time::{sleep, Duration};

use crate::clock::Clock;
use crate::error::SensorError;
use crate::rotation::RotationCounters;
use crate::types::{RawSample, ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS};

/// A 6-axis inertial sensor. Register-level access lives behind this trait.
pub trait SampleSource: Send {
    /// Whether the device answered at init. Absent devices are not re-probed
    /// until the owner explicitly reinitializes.
    fn is_present(&mut self) -> bool;

    fn read_raw_sample(&mut self) -> Result<RawSample, SensorError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn is_present(&mut self) -> bool {
        (**self).is_present()
    }

    fn read_raw_sample(&mut self) -> Result<RawSample, SensorError> {
        (**self).read_raw_sample()
    }
}

/// Synthetic sensor: 1 g along a (possibly tilted) axis plus deck vibration
/// and a little gyro noise.
#[derive(Debug, Clone)]
pub struct SimulatedImu {
    tilt_deg: f64,
    vibration_g: f64,
    gyro_bias_dps: [f64; 3],
    step: u64,
}

impl SimulatedImu {
    pub fn new(tilt_deg: f64) -> Self {
        Self {
            tilt_deg,
            vibration_g: 0.02,
            gyro_bias_dps: [0.4, -0.2, 0.1],
            step: 0,
        }
    }

    pub fn with_vibration(mut self, vibration_g: f64) -> Self {
        self.vibration_g = vibration_g;
        self
    }
}

impl SampleSource for SimulatedImu {
    fn is_present(&mut self) -> bool {
        true
    }

    fn read_raw_sample(&mut self) -> Result<RawSample, SensorError> {
        use std::f64::consts::PI;
        let t = self.step as f64 * 0.02;
        self.step += 1;

        let tilt = self.tilt_deg.to_radians();
        let shake = (t * 2.0 * PI * 7.0).sin() * self.vibration_g;
        let accel = [
            (tilt.sin() + shake * 0.5) * ACCEL_LSB_PER_G,
            (t * 2.0 * PI * 3.0).cos() * self.vibration_g * 0.3 * ACCEL_LSB_PER_G,
            (tilt.cos() + shake) * ACCEL_LSB_PER_G,
        ];
        let gyro = [
            (self.gyro_bias_dps[0] + (t * 0.5).sin() * 0.05) * GYRO_LSB_PER_DPS,
            (self.gyro_bias_dps[1] + (t * 0.3).cos() * 0.03) * GYRO_LSB_PER_DPS,
            (self.gyro_bias_dps[2] + (t * 1.0).sin() * 0.1) * GYRO_LSB_PER_DPS,
        ];
        Ok(RawSample::new(accel, gyro))
    }
}

/// Replays a fixed list of read results, then repeats the last one. An empty
/// script behaves as an absent sensor.
#[derive(Debug, Clone)]
pub struct ScriptedImu {
    script: VecDeque<Result<RawSample, SensorError>>,
    last: Option<Result<RawSample, SensorError>>,
    present: bool,
    reads: u64,
}

impl ScriptedImu {
    pub fn new(script: impl IntoIterator<Item = Result<RawSample, SensorError>>) -> Self {
        let script: VecDeque<_> = script.into_iter().collect();
        let present = !script.is_empty();
        Self {
            script,
            last: None,
            present,
            reads: 0,
        }
    }

    /// The same sample forever.
    pub fn constant(sample: RawSample) -> Self {
        Self::new([Ok(sample)])
    }

    pub fn absent() -> Self {
        Self::new([])
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SampleSource for ScriptedImu {
    fn is_present(&mut self) -> bool {
        self.present
    }

    fn read_raw_sample(&mut self) -> Result<RawSample, SensorError> {
        self.reads += 1;
        if let Some(next) = self.script.pop_front() {
            self.last = Some(next.clone());
            return next;
        }
        self.last
            .clone()
            .unwrap_or_else(|| Err(SensorError::Unavailable("no device".to_string())))
    }
}

/// Drive the rotation counters as a roller turning at `speed_mps` would.
///
/// With `bounce` set every real edge is followed by a chatter edge 2 ms later,
/// which the debounce window must reject. Runs until the task is dropped.
pub async fn pulse_loop<C: Clock>(
    counters: Arc<RotationCounters>,
    clock: C,
    speed_mps: f64,
    distance_per_pulse_m: f64,
    bounce: bool,
) {
    if speed_mps <= 0.0 || distance_per_pulse_m <= 0.0 {
        info!("[pulse] simulated roller stopped");
        return;
    }
    let period = Duration::from_secs_f64(distance_per_pulse_m / speed_mps);
    info!(
        "[pulse] simulating {:.2} m/s ({:.1} ms between pulses{})",
        speed_mps,
        period.as_secs_f64() * 1000.0,
        if bounce { ", with contact bounce" } else { "" }
    );

    let mut emitted = 0u64;
    loop {
        sleep(period).await;
        counters.on_pulse(clock.micros(), clock.millis());
        emitted += 1;

        if bounce {
            sleep(Duration::from_millis(2)).await;
            if counters.on_pulse(clock.micros(), clock.millis()) {
                debug!("[pulse] bounce edge was counted");
            }
        }

        if emitted % 100 == 0 {
            debug!("[pulse] {} edges, {} counted", emitted, counters.count());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;

    #[test]
    fn test_scripted_imu_replays_then_repeats() {
        let a = RawSample::new([1.0, 0.0, 0.0], [0.0; 3]);
        let b = RawSample::new([0.0, 1.0, 0.0], [0.0; 3]);
        let mut imu = ScriptedImu::new([
            Ok(a),
            Err(SensorError::TransientRead("nack".into())),
            Ok(b),
        ]);
        assert!(imu.is_present());
        assert_eq!(imu.read_raw_sample(), Ok(a));
        assert!(imu.read_raw_sample().is_err());
        assert_eq!(imu.read_raw_sample(), Ok(b));
        assert_eq!(imu.read_raw_sample(), Ok(b));
        assert_eq!(imu.reads(), 4);
    }

    #[test]
    fn test_absent_imu() {
        let mut imu = ScriptedImu::absent();
        assert!(!imu.is_present());
        assert!(matches!(imu.read_raw_sample(), Err(SensorError::Unavailable(_))));
    }

    #[test]
    fn test_simulated_imu_near_one_g() {
        let mut imu = SimulatedImu::new(0.0);
        for _ in 0..50 {
            let s = imu.read_raw_sample().unwrap();
            let g = s.accel_vec().norm() / ACCEL_LSB_PER_G;
            assert!((g - 1.0).abs() < 0.05, "got {g}");
        }
    }

    #[test]
    fn test_simulated_imu_without_vibration() {
        let mut imu = SimulatedImu::new(30.0).with_vibration(0.0);
        let s = imu.read_raw_sample().unwrap();
        assert!((s.accel_vec().norm() / ACCEL_LSB_PER_G - 1.0).abs() < 1e-12);
        assert!((s.accel[0] / ACCEL_LSB_PER_G - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_pulse_loop_with_bounce_counts_real_edges() {
        let counters = Arc::new(RotationCounters::new(10_000));
        // 0.5 m per pulse at 25 m/s -> a pulse every 20 ms
        let task = tokio::spawn(pulse_loop(
            Arc::clone(&counters),
            MonotonicClock::new(),
            25.0,
            0.5,
            true,
        ));
        sleep(Duration::from_millis(130)).await;
        task.abort();

        let snap = counters.snapshot();
        assert!((1..=7).contains(&snap.count), "count {}", snap.count);
        // Bounce edges never produce a 2 ms interval.
        assert!(snap.count < 2 || snap.last_interval_us >= 10_000);
    }

    #[tokio::test]
    async fn test_pulse_loop_stopped_roller() {
        let counters = Arc::new(RotationCounters::new(50_000));
        pulse_loop(Arc::clone(&counters), MonotonicClock::new(), 0.0, 0.3, false).await;
        assert_eq!(counters.count(), 0);
    }
}
