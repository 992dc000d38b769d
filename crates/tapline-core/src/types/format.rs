//! Stream format metadata.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Size of one sample in bytes. Streams always carry 32-bit float samples.
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

/// Negotiated properties of an input stream.
///
/// Samples are interleaved little-endian `f32`, one per channel per frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StreamFormat {
    /// Number of interleaved channels.
    pub channel_count: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Software latency reported by the backend, in seconds.
    pub software_latency: f64,
}

impl StreamFormat {
    pub const fn new(channel_count: u16, sample_rate: u32, software_latency: f64) -> Self {
        Self {
            channel_count,
            sample_rate,
            software_latency,
        }
    }

    /// Reject formats the capture core cannot size buffers for.
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(Error::InvalidArgument("channel count must be nonzero".into()));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidArgument("sample rate must be nonzero".into()));
        }
        if !self.software_latency.is_finite() || self.software_latency < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "software latency must be a non-negative number, got {}",
                self.software_latency
            )));
        }
        Ok(())
    }

    /// Bytes occupied by one frame (one sample for every channel).
    pub const fn bytes_per_frame(&self) -> usize {
        BYTES_PER_SAMPLE * self.channel_count as usize
    }

    /// Bytes needed to hold `seconds` worth of whole frames, or `None` when
    /// that does not fit in `usize`.
    ///
    /// The frame count is truncated, so the result is always a multiple of
    /// [`Self::bytes_per_frame`].
    pub fn buffer_size_for(&self, seconds: f64) -> Option<usize> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Some(0);
        }
        let frames = (f64::from(self.sample_rate) * seconds).floor();
        if frames >= usize::MAX as f64 {
            return None;
        }
        self.bytes_per_frame().checked_mul(frames as usize)
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 48000,
            software_latency: 1.0 / 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_frame() {
        let format = StreamFormat::new(2, 48000, 0.01);
        assert_eq!(format.bytes_per_frame(), 8);
        assert_eq!(StreamFormat::new(6, 48000, 0.01).bytes_per_frame(), 24);
    }

    #[test]
    fn test_buffer_size_truncates_to_whole_frames() {
        let format = StreamFormat::new(2, 48000, 0.0);
        // 48000 * 0.1 = 4800 frames
        assert_eq!(format.buffer_size_for(0.1), Some(4800 * 8));
        // 44.1 kHz at 0.25 s = 11025 frames
        let format = StreamFormat::new(1, 44100, 0.0);
        assert_eq!(format.buffer_size_for(0.25), Some(11025 * 4));
        assert_eq!(format.buffer_size_for(0.000_01), Some(0));
        assert_eq!(format.buffer_size_for(-1.0), Some(0));
        assert_eq!(format.buffer_size_for(f64::NAN), Some(0));
    }

    #[test]
    fn test_buffer_size_overflow_is_none() {
        let format = StreamFormat::new(2, 48000, 0.0);
        assert_eq!(format.buffer_size_for(1e20), None);
        assert_eq!(format.buffer_size_for(f64::MAX), None);
        // Frame count fits in usize but the byte count does not.
        let frames = (usize::MAX / 8) as f64 * 2.0;
        assert_eq!(format.buffer_size_for(frames / 48000.0), None);
    }

    #[test]
    fn test_validate() {
        assert!(StreamFormat::default().validate().is_ok());
        assert!(StreamFormat::new(0, 48000, 0.0).validate().is_err());
        assert!(StreamFormat::new(2, 0, 0.0).validate().is_err());
        assert!(StreamFormat::new(2, 48000, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let format = StreamFormat::new(4, 96000, 0.005);
        let json = serde_json::to_string(&format).unwrap();
        let parsed: StreamFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, format);
    }
}
