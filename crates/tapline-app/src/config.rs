//! Demo configuration, loaded from an optional JSON file.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tapline_audio::ToneSettings;
use tapline_core::CaptureConfig;

const MIN_TICK_RATE_HZ: f64 = 0.1;
const MAX_TICK_RATE_HZ: f64 = 1000.0;
/// One week.
const MAX_DURATION_SECS: f64 = 604_800.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub tone: ToneSettings,
    /// Host ticks per second.
    pub tick_rate_hz: f64,
    /// How long to run before closing the stream.
    pub duration_secs: f64,
    /// Samples per spectrum analysis; a power of two.
    pub spectrum_width: usize,
    /// Decibels below full scale covered by the meter bar.
    pub meter_range_db: f32,
    /// Log a reading every n-th tick.
    pub report_every: u32,
    /// Channel carrying LTC audio, if any.
    pub ltc_channel: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            tone: ToneSettings::default(),
            tick_rate_hz: 60.0,
            duration_secs: 3.0,
            spectrum_width: 256,
            meter_range_db: 60.0,
            report_every: 30,
            ltc_channel: None,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        if !(MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ).contains(&self.tick_rate_hz) {
            bail!(
                "tick_rate_hz must be in {MIN_TICK_RATE_HZ}..={MAX_TICK_RATE_HZ}, got {}",
                self.tick_rate_hz
            );
        }
        if !(0.0..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            bail!(
                "duration_secs must be in 0..={MAX_DURATION_SECS}, got {}",
                self.duration_secs
            );
        }
        if self.report_every == 0 {
            bail!("report_every must be at least 1");
        }
        if let Some(channel) = self.ltc_channel {
            if channel >= usize::from(self.tone.channel_count) {
                bail!(
                    "ltc_channel {channel} out of range for {} channels",
                    self.tone.channel_count
                );
            }
        }
        Ok(())
    }

    /// Tick period and total run time.
    pub fn timing(&self) -> Result<(Duration, Duration)> {
        let period = Duration::try_from_secs_f64(self.tick_rate_hz.recip())
            .with_context(|| format!("tick_rate_hz {} has no usable period", self.tick_rate_hz))?;
        let run = Duration::try_from_secs_f64(self.duration_secs)
            .with_context(|| format!("duration_secs {} is out of range", self.duration_secs))?;
        Ok((period, run))
    }
}
