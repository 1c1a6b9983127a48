//! Tilt and rolling-speed engine for a treadmill speed reader.
//!
//! A 6-axis IMU feeds a complementary attitude filter; a rotation pulse input
//! feeds lock-free counters. Both publish into one shared store that display
//! and network consumers read through [`Monitor`].

use std::sync::Arc;

pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod filters;
pub mod health_monitor;
pub mod live_status;
pub mod monitor;
pub mod rotation;
pub mod sampler;
pub mod sensors;
pub mod session;
pub mod store;
pub mod types;


pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::ReaderConfig;
pub use error::{Result, SpeedReaderError};
pub use monitor::Monitor;
pub use rotation::{RotationCounters, SpeedModel};
pub use sampler::{AttitudeSampler, SamplerStats, TickOutcome};
pub use sensors::SampleSource;
pub use store::SharedStore;

/// The wired-up engine. The sampler is owned by whichever task ticks it;
/// `counters` goes to the edge input and `monitor` to every reader.
pub struct Engine<S, C: Clock + 'static> {
    pub sampler: AttitudeSampler<S, Arc<C>>,
    pub monitor: Monitor,
    pub counters: Arc<RotationCounters>,
    pub store: Arc<SharedStore>,
    pub clock: Arc<C>,
}

/// Composition root: validate the config and build every shared instance.
pub fn assemble<S, C>(config: &ReaderConfig, source: S, clock: Arc<C>) -> Result<Engine<S, C>>
where
    S: SampleSource,
    C: Clock + 'static,
{
    config.validate()?;

    let store = Arc::new(SharedStore::new());
    let counters = Arc::new(RotationCounters::new(config.rotation.debounce_us));
    let model = SpeedModel::from_config(&config.rotation);
    let monitor = Monitor::new(
        Arc::clone(&store),
        Arc::clone(&counters),
        model,
        clock.clone(),
    );
    let sampler = AttitudeSampler::new(config, source, Arc::clone(&clock), Arc::clone(&store));

    log::info!(
        "[engine] assembled: debounce {} ms, {:.4} m per pulse, timeout {} ms",
        config.rotation.debounce_us / 1000,
        model.distance_per_pulse_m,
        model.timeout_ms
    );

    Ok(Engine {
        sampler,
        monitor,
        counters,
        store,
        clock,
    })
}
