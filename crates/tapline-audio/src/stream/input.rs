//! Input stream: owns a backend, its capture ring and the last frame window.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use tapline_core::{CaptureConfig, Error, Result, StreamError, StreamFormat};
use tracing::{debug, error, info, warn};

use super::handler::{EventReceiver, StreamShared, MAX_CHANNELS};
use super::{CaptureBackend, StreamEvent, StreamHandler};
use crate::buffer::{FrameWindowExtractor, RingBuffer, TickReport};

/// A running capture stream.
///
/// The backend writes into the ring buffer from its own thread; the owner
/// calls [`update`](Self::update) once per tick and then reads
/// [`last_frame_window`](Self::last_frame_window) until the next tick.
pub struct InputStream {
    backend: Box<dyn CaptureBackend>,
    shared: Arc<StreamShared>,
    events: EventReceiver,
    extractor: FrameWindowExtractor,
    format: StreamFormat,
    last_update: Instant,
    /// Backend overflow notifications seen so far.
    overflow_events: u64,
    closed: bool,
}

impl InputStream {
    /// Negotiate and start a stream on `backend`.
    ///
    /// Ring and window are sized to hold `buffered_ticks` periods of the
    /// effective latency, so neither a stalled consumer nor a burst of
    /// callbacks overflows them.
    pub fn open(mut backend: Box<dyn CaptureBackend>, config: &CaptureConfig) -> Result<Self> {
        config.validate()?;

        let format = backend.open(config.min_latency_secs)?;
        let capacity = match Self::buffer_size(&format, config) {
            Ok(capacity) => capacity,
            Err(e) => {
                backend.stop();
                return Err(e);
            }
        };

        let shared = Arc::new(StreamShared::new(RingBuffer::new(capacity)?));
        let (event_tx, event_rx) = bounded(config.event_queue_len);
        let handler = StreamHandler::new(Arc::clone(&shared), event_tx, &format, capacity);

        if let Err(e) = backend.start(handler) {
            error!("Failed to start {}: {e}", backend.name());
            backend.stop();
            return Err(Error::StreamOpen(format!("{}: {e}", backend.name())));
        }

        info!(
            "Input stream started on {}: {} Hz, {} channels, latency {:.1} ms, buffer {} bytes",
            backend.name(),
            format.sample_rate,
            format.channel_count,
            format.software_latency * 1000.0,
            capacity
        );

        Ok(Self {
            backend,
            shared,
            events: event_rx,
            extractor: FrameWindowExtractor::new(format, capacity),
            format,
            last_update: Instant::now(),
            overflow_events: 0,
            closed: false,
        })
    }

    fn buffer_size(format: &StreamFormat, config: &CaptureConfig) -> Result<usize> {
        format
            .validate()
            .map_err(|e| Error::StreamOpen(format!("backend granted an unusable format: {e}")))?;

        if usize::from(format.channel_count) > MAX_CHANNELS {
            return Err(Error::StreamOpen(format!(
                "{} channels exceeds the supported maximum of {MAX_CHANNELS}",
                format.channel_count
            )));
        }

        match config.buffer_size(format)? {
            0 => Err(Error::StreamOpen(
                "latency too small to hold a single frame".to_string(),
            )),
            size => Ok(size),
        }
    }

    /// Advance one tick using the wall-clock time since the previous one.
    pub fn update(&mut self) -> TickReport {
        let elapsed = self.last_update.elapsed();
        self.update_with_elapsed(elapsed)
    }

    /// Advance one tick covering `elapsed` of audio, e.g. the host's frame
    /// delta time.
    pub fn update_with_elapsed(&mut self, elapsed: Duration) -> TickReport {
        self.last_update = Instant::now();

        if self.closed {
            return TickReport::default();
        }

        self.drain_events();

        if !self.is_valid() {
            self.extractor.reset();
            return TickReport::default();
        }

        self.extractor.tick(&self.shared.ring, elapsed)
    }

    fn drain_events(&mut self) {
        for event in self.events.try_iter() {
            match event {
                StreamEvent::Overflow => {
                    self.overflow_events += 1;
                    warn!("Input stream overflow reported by {}", self.backend.name());
                }
                StreamEvent::Error(e) => {
                    error!("Input stream error on {}: {e}", self.backend.name());
                }
            }
        }
    }

    /// Whether the stream is open and the backend has not failed.
    pub fn is_valid(&self) -> bool {
        !self.closed
            && self.shared.running.load(Ordering::Acquire)
            && !self.shared.is_failed()
    }

    /// The backend error that invalidated this stream, if any.
    pub fn fault(&self) -> Option<StreamError> {
        self.shared.fault()
    }

    /// `Ok` while the stream is usable.
    pub fn check(&self) -> Result<()> {
        match self.fault() {
            Some(e) => Err(Error::StreamInvalid(e)),
            None if self.closed => Err(Error::StreamOpen("stream is closed".to_string())),
            None => Ok(()),
        }
    }

    pub const fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub const fn channel_count(&self) -> u16 {
        self.format.channel_count
    }

    pub const fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Software latency granted by the backend, in seconds.
    pub const fn latency(&self) -> f64 {
        self.format.software_latency
    }

    /// Audio captured since the previous tick as interleaved little-endian
    /// `f32` bytes. Empty after an underrun.
    pub fn last_frame_window(&self) -> &[u8] {
        self.extractor.bytes()
    }

    /// Audio captured since the previous tick as interleaved samples.
    pub fn last_frame_samples(&self) -> &[f32] {
        self.extractor.samples()
    }

    /// Capacity of the ring buffer and window in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.extractor.capacity()
    }

    /// Bytes currently waiting in the ring buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.ring.lock().fill_count()
    }

    pub const fn overflow_events(&self) -> u64 {
        self.overflow_events
    }

    /// Stop the backend, then release the capture buffers.
    ///
    /// The backend is always stopped before anything it writes into is
    /// dropped. Calling this more than once is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.shared.running.store(false, Ordering::Release);
        self.backend.stop();
        self.closed = true;
        self.extractor.reset();

        debug!("Input stream on {} closed", self.backend.name());
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.close();
    }
}
