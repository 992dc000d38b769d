//! Analysis helpers that consume the last frame window.
//!
//! None of these touch the capture buffers; they read the interleaved
//! `f32` window a stream exposes after each tick.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

pub mod biquad;
pub mod level;
pub mod ltc;
pub mod spectrum;

pub use biquad::{Bands, BiquadFilter, MultibandFilter};
pub use level::{meter_scale, LevelMeter};
pub use ltc::{Timecode, TimecodeDecoder};
pub use spectrum::{peak_bin, to_decibels, SpectrumAnalyzer};

use tapline_core::{Error, Result};

/// RMS of a full-scale sine wave; maps to 0 dBFS.
pub const REFERENCE_LEVEL: f32 = 0.7071;

/// Added before the logarithm so silence maps to a finite floor.
pub const ZERO_OFFSET: f32 = 1.5849e-13;

/// Convert a linear RMS or magnitude value to dBFS.
pub fn to_dbfs(value: f32) -> f32 {
    20.0 * (value / REFERENCE_LEVEL + ZERO_OFFSET).log10()
}

/// Iterate the samples of one channel in an interleaved window.
pub fn channel_samples(
    samples: &[f32],
    channel_count: usize,
    channel: usize,
) -> Result<impl Iterator<Item = f32> + '_> {
    if channel >= channel_count {
        return Err(Error::InvalidArgument(format!(
            "channel {channel} out of range for {channel_count} channels"
        )));
    }
    Ok(samples
        .iter()
        .skip(channel)
        .step_by(channel_count)
        .copied())
}

/// Copy one channel of an interleaved window into `out`, replacing its
/// contents. Trailing partial frames are ignored.
pub fn extract_channel(
    samples: &[f32],
    channel_count: usize,
    channel: usize,
    out: &mut Vec<f32>,
) -> Result<()> {
    out.clear();
    let frames = samples.len() / channel_count.max(1);
    out.extend(channel_samples(samples, channel_count, channel)?.take(frames));
    Ok(())
}
