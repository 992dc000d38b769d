//! Capture configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

use crate::{Error, Result, StreamFormat};

/// Longest span of audio, in seconds, a ring buffer may be sized for.
pub const MAX_BUFFERED_SECS: f64 = 10.0;

/// The event queue is allocated up front, so its length is capped too.
const MAX_EVENT_QUEUE_LEN: usize = 4096;

/// Tunables applied when an input stream is opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Lower bound for the software latency requested from the backend,
    /// in seconds. Defaults to one 60 Hz frame.
    pub min_latency_secs: f64,
    /// How many ticks of audio the ring buffer and window can hold before
    /// overflowing. Covers both a stalled consumer and a burst of callbacks.
    pub buffered_ticks: u32,
    /// Capacity of the queue carrying backend notifications to the consumer.
    pub event_queue_len: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_latency_secs: 1.0 / 60.0,
            buffered_ticks: 4,
            event_queue_len: 32,
        }
    }
}

impl CaptureConfig {
    /// Load a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_latency_secs.is_finite() || self.min_latency_secs <= 0.0 {
            return Err(Error::Config(format!(
                "min_latency_secs must be positive, got {}",
                self.min_latency_secs
            )));
        }
        if self.buffered_ticks == 0 {
            return Err(Error::Config("buffered_ticks must be at least 1".into()));
        }
        let buffered = self.min_latency_secs * f64::from(self.buffered_ticks);
        if buffered > MAX_BUFFERED_SECS {
            return Err(Error::Config(format!(
                "min_latency_secs x buffered_ticks is {buffered} s, limit is {MAX_BUFFERED_SECS} s"
            )));
        }
        if self.event_queue_len == 0 || self.event_queue_len > MAX_EVENT_QUEUE_LEN {
            return Err(Error::Config(format!(
                "event_queue_len must be in 1..={MAX_EVENT_QUEUE_LEN}, got {}",
                self.event_queue_len
            )));
        }
        Ok(())
    }

    /// Latency used for buffer sizing: the larger of the configured floor
    /// and what the backend actually reported.
    pub fn best_latency(&self, format: &StreamFormat) -> f64 {
        self.min_latency_secs.max(format.software_latency)
    }

    /// Ring buffer and window capacity, in bytes, for a stream of `format`.
    ///
    /// Fails when the backend's latency pushes the buffered span past
    /// [`MAX_BUFFERED_SECS`].
    pub fn buffer_size(&self, format: &StreamFormat) -> Result<usize> {
        let seconds = self.best_latency(format) * f64::from(self.buffered_ticks);
        if seconds > MAX_BUFFERED_SECS {
            return Err(Error::Config(format!(
                "buffering {seconds} s of audio exceeds the {MAX_BUFFERED_SECS} s limit"
            )));
        }
        format.buffer_size_for(seconds).ok_or_else(|| {
            Error::Config(format!("buffer for {seconds} s of audio does not fit in memory"))
        })
    }
}
