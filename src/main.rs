use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use speed_reader_rs::health_monitor::StartupReport;
use speed_reader_rs::sensors::{pulse_loop, SimulatedImu};
use speed_reader_rs::{assemble, Engine, Monitor, MonotonicClock, ReaderConfig};

#[derive(Parser, Debug)]
#[command(name = "speed_reader")]
#[command(about = "Treadmill tilt and speed reader (simulated hardware)", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated belt speed in m/s (0 = roller stopped)
    #[arg(long, default_value = "2.0")]
    speed: f64,

    /// Simulated deck tilt in degrees
    #[arg(long, default_value = "0.0")]
    tilt: f64,

    /// Simulated deck vibration amplitude in g
    #[arg(long, default_value = "0.02")]
    vibration: f64,

    /// Override the pulse debounce window (ms)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Disable simulated contact bounce
    #[arg(long)]
    no_bounce: bool,

    /// Start a job session with this label
    #[arg(long)]
    job: Option<String>,

    /// Output directory
    #[arg(long, default_value = "speed_reader_status")]
    output_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ReaderConfig::load(path)?,
        None => ReaderConfig::default(),
    };
    if let Some(ms) = args.debounce_ms {
        config.rotation.debounce_us = ms * 1000;
    }

    println!("[{}] Speed Reader RS Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Simulated speed: {:.2} m/s, tilt {:.1}°", args.speed, args.tilt);
    println!("  Debounce: {} ms", config.rotation.debounce_us / 1000);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let clock = Arc::new(MonotonicClock::new());
    let Engine {
        mut sampler,
        monitor,
        counters,
        ..
    } = assemble(
        &config,
        SimulatedImu::new(args.tilt).with_vibration(args.vibration),
        clock.clone(),
    )?;

    // Blocking calibration off the async workers. Nothing else samples yet.
    println!("[{}] Calibrating (hold the deck still)...", ts_now());
    let (sampler, calibration) = tokio::task::spawn_blocking(move || {
        let result = sampler.calibrate_default();
        (sampler, result)
    })
    .await?;
    if let Err(e) = &calibration {
        log::warn!("[calib] {}", e);
    }
    StartupReport::new(sampler.is_present(), calibration.as_ref().ok()).log();

    if let Some(job) = &args.job {
        monitor.start_session(job)?;
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    let sample_period = Duration::from_millis(config.tasks.sample_interval_ms);
    let sampler_task = tokio::spawn(sampler.run_until(sample_period, stop_rx.clone()));

    let pulse_task = tokio::spawn(pulse_loop(
        counters,
        clock,
        args.speed,
        config.rotation.distance_per_pulse_m(),
        !args.no_bounce,
    ));

    let display_task = tokio::spawn(display_loop(
        monitor.clone(),
        Duration::from_millis(config.tasks.display_interval_ms),
        stop_rx.clone(),
    ));

    let status_path = Path::new(&args.output_dir).join("live_status.json");
    let status_task = tokio::spawn(status_loop(
        monitor.clone(),
        status_path.clone(),
        Duration::from_secs(config.tasks.status_interval_secs),
        stop_rx,
    ));

    if args.duration > 0 {
        sleep(Duration::from_secs(args.duration)).await;
    } else {
        tokio::signal::ctrl_c().await?;
        println!();
    }

    println!("[{}] Shutting down...", ts_now());
    let _ = stop_tx.send(true);
    pulse_task.abort();
    let sampler = sampler_task.await?;
    display_task.await?;
    status_task.await?;

    // Final live status update
    let final_readings = monitor.readings();
    final_readings.save(&status_path)?;

    println!("\n=== Final Stats ===");
    println!("Sampler: {}", sampler.stats().format_status());
    println!("Rotations: {}", final_readings.rotations);
    println!("Distance: {:.2} m", final_readings.distance_m);
    println!("Max speed: {:.2} m/s", final_readings.max_speed_mps);
    println!(
        "Angle: {:+.1}° (range {:+.1}° .. {:+.1}°)",
        final_readings.angle_deg, final_readings.min_angle_deg, final_readings.max_angle_deg
    );
    println!("Status written to {}", status_path.display());

    Ok(())
}

async fn display_loop(monitor: Monitor, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("[{}] {}", ts_now(), monitor.readings().display_line());
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

async fn status_loop(
    monitor: Monitor,
    path: PathBuf,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = monitor.readings().save(&path) {
                    log::warn!("[status] write {} failed: {}", path.display(), e);
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
