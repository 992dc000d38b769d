//! # Tapline
//!
//! Opens one capture stream, ticks it at a fixed rate and logs what the
//! last frame window contains. Uses the synthetic tone backend, so it runs
//! without an audio device.
//!
//! Usage: `tapline [config.json]`

mod config;
mod monitor;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use config::AppConfig;
use monitor::Monitor;
use tapline_audio::{Driver, ToneBackend};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tapline=info,tapline_app=info,tapline_audio=info".into()),
        )
        .init();

    info!("Starting Tapline v{}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(path.as_deref())?;
    debug!("Config: {:?}", config);

    run(&config)
}

fn run(config: &AppConfig) -> Result<()> {
    let mut driver = Driver::new(config.capture.clone())?;
    let id = driver.open_stream(Box::new(ToneBackend::new(config.tone.clone())))?;

    let format = *driver
        .stream(id)
        .context("stream vanished right after opening")?
        .format();
    let mut monitor = Monitor::new(
        &format,
        config.spectrum_width,
        config.meter_range_db,
        config.ltc_channel,
    )?;

    let (period, run_time) = config.timing()?;
    let end = Instant::now()
        .checked_add(run_time)
        .context("run duration overflows the clock")?;
    let mut next_tick = Instant::now() + period;
    let mut ticks: u64 = 0;
    let mut empty_windows: u64 = 0;

    while Instant::now() < end {
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        }
        next_tick += period;
        ticks += 1;

        for pruned in driver.update() {
            warn!("{} was dropped ({:?})", pruned.id, pruned.fault);
        }

        let Some(stream) = driver.stream(id) else {
            warn!("Capture stream lost; stopping early");
            break;
        };

        let samples = stream.last_frame_samples();
        if samples.is_empty() {
            empty_windows += 1;
            continue;
        }

        let reading = monitor.process(samples)?;
        if ticks % u64::from(config.report_every) == 0 {
            let peak = reading
                .peak
                .map_or_else(|| "-".to_string(), |(hz, db)| format!("{hz:.0} Hz @ {db:.1} dBFS"));
            info!(
                "tick {ticks}: {} frames, level {:.1} dBFS (low {:.1} / band {:.1} / high {:.1}), peak {peak}",
                reading.frames,
                reading.levels.bypass,
                reading.levels.low,
                reading.levels.band,
                reading.levels.high,
            );
            if let Some(tc) = reading.timecode {
                info!("timecode {tc}");
            }
        }
    }

    let overflows = driver.stream(id).map_or(0, |stream| stream.overflow_events());
    if driver.stream(id).is_some() {
        driver.close_stream(id)?;
    }

    info!(
        "Done: {ticks} ticks, {empty_windows} empty windows, {overflows} overflow events"
    );
    Ok(())
}
