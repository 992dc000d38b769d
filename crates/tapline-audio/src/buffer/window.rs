//! Per-tick "last frame window" drained from the capture ring buffer.
//!
//! Each consumer tick takes a slice of the ring proportional to the time
//! elapsed since the previous tick and copies it into a fixed window that
//! downstream analysis reads without further locking. The window holds
//! interleaved `f32` samples captured since the previous tick, oldest first,
//! and stays valid until the next tick.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::time::Duration;

use parking_lot::Mutex;
use tapline_core::{StreamFormat, BYTES_PER_SAMPLE};
use tracing::{debug, warn};

use super::RingBuffer;

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Bytes now valid in the window.
    pub window_size: usize,
    /// Bytes the elapsed time asked for.
    pub requested: usize,
    /// The ring held less than `requested`; the window was left empty.
    pub underrun: bool,
    /// The ring had overflowed and was cleared after the drain.
    pub resynced: bool,
}

/// Drains the ring buffer into the last frame window once per tick.
#[derive(Debug)]
pub struct FrameWindowExtractor {
    /// Window storage, allocated once.
    window: Box<[f32]>,
    /// Bytes valid for the most recent tick.
    window_size: usize,
    format: StreamFormat,
}

impl FrameWindowExtractor {
    /// Allocate a window able to hold `capacity` bytes, rounded down to
    /// whole frames.
    pub fn new(format: StreamFormat, capacity: usize) -> Self {
        let frame = format.bytes_per_frame().max(1);
        let samples = capacity / frame * frame / BYTES_PER_SAMPLE;

        Self {
            window: vec![0.0f32; samples].into_boxed_slice(),
            window_size: 0,
            format,
        }
    }

    /// Window capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.window.len() * BYTES_PER_SAMPLE
    }

    /// Bytes valid for the most recent tick.
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    pub const fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Window size for `elapsed` seconds of audio, clamped to capacity.
    pub fn window_size_for(&self, elapsed: Duration) -> usize {
        self.format
            .buffer_size_for(elapsed.as_secs_f64())
            .map_or(self.capacity(), |size| size.min(self.capacity()))
    }

    /// Run one tick.
    ///
    /// The ring's lock is taken once for the fill check, the drain and the
    /// overflow reset, and released before returning.
    pub fn tick(&mut self, ring: &Mutex<RingBuffer>, elapsed: Duration) -> TickReport {
        let requested = self.window_size_for(elapsed);
        let mut report = TickReport {
            requested,
            ..TickReport::default()
        };

        {
            let mut ring = ring.lock();
            let available = ring.fill_count();

            if available >= requested {
                let samples = requested / BYTES_PER_SAMPLE;
                ring.read(bytemuck::cast_slice_mut(&mut self.window[..samples]));
                self.window_size = requested;
            } else {
                // Never hand out a mix of stale and fresh samples.
                self.window_size = 0;
                report.underrun = true;
                debug!(
                    "Window underrun: requested {} bytes, {} buffered",
                    requested, available
                );
            }

            if ring.overflow_count() > 0 {
                warn!(
                    "Resynchronizing after {} overflow(s), {} bytes lost",
                    ring.overflow_count(),
                    ring.dropped_bytes()
                );
                ring.clear();
                report.resynced = true;
            }
        }

        report.window_size = self.window_size;
        report
    }

    /// Invalidate the window without touching the ring.
    pub fn reset(&mut self) {
        self.window_size = 0;
    }

    /// The last frame window as raw little-endian bytes.
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.samples())
    }

    /// The last frame window as interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.window[..self.window_size / BYTES_PER_SAMPLE]
    }

    /// Number of whole frames in the last window.
    pub fn frame_count(&self) -> usize {
        self.window_size / self.format.bytes_per_frame().max(1)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn stereo() -> StreamFormat {
        StreamFormat::new(2, 1000, 0.0)
    }

    fn samples_as_bytes(samples: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(samples).to_vec()
    }

    #[test]
    fn test_window_size_tracks_elapsed_time() {
        let extractor = FrameWindowExtractor::new(stereo(), 800);
        // 1 kHz stereo f32: 8 bytes per frame, 10 frames per 10 ms.
        assert_eq!(extractor.window_size_for(Duration::from_millis(10)), 80);
        // Clamped to capacity.
        assert_eq!(extractor.window_size_for(Duration::from_secs(1)), 800);
        assert_eq!(extractor.window_size_for(Duration::ZERO), 0);
        assert_eq!(extractor.window_size_for(Duration::MAX), 800);
    }

    #[test]
    fn test_capacity_rounds_to_whole_frames() {
        let extractor = FrameWindowExtractor::new(stereo(), 803);
        assert_eq!(extractor.capacity(), 800);
    }

    #[test]
    fn test_tick_drains_oldest_first() {
        let ring = Mutex::new(RingBuffer::new(800).unwrap());
        let mut extractor = FrameWindowExtractor::new(stereo(), 800);

        let captured: Vec<f32> = (0..40).map(|i| i as f32).collect();
        ring.lock().write(&samples_as_bytes(&captured));

        // 10 ms = 10 frames = 20 samples.
        let report = extractor.tick(&ring, Duration::from_millis(10));
        assert_eq!(report.window_size, 80);
        assert!(!report.underrun);
        assert_eq!(extractor.samples(), &captured[..20]);
        assert_eq!(extractor.frame_count(), 10);
        assert_eq!(extractor.bytes().len(), 80);

        extractor.tick(&ring, Duration::from_millis(10));
        assert_eq!(extractor.samples(), &captured[20..]);
        assert_eq!(ring.lock().fill_count(), 0);
    }

    #[test]
    fn test_underrun_yields_empty_window() {
        let ring = Mutex::new(RingBuffer::new(800).unwrap());
        let mut extractor = FrameWindowExtractor::new(stereo(), 800);

        ring.lock().write(&samples_as_bytes(&[1.0; 30]));
        extractor.tick(&ring, Duration::from_millis(10));
        assert_eq!(extractor.samples().len(), 20);

        // Only 10 samples left, 20 requested.
        let report = extractor.tick(&ring, Duration::from_millis(10));
        assert!(report.underrun);
        assert_eq!(report.window_size, 0);
        assert!(extractor.samples().is_empty());
        // Nothing was consumed.
        assert_eq!(ring.lock().fill_count(), 40);
    }

    #[test]
    fn test_overflow_resynchronizes_after_drain() {
        let ring = Mutex::new(RingBuffer::new(160).unwrap());
        let mut extractor = FrameWindowExtractor::new(stereo(), 160);

        let captured: Vec<f32> = (0..50).map(|i| i as f32).collect();
        ring.lock().write(&samples_as_bytes(&captured));
        assert_eq!(ring.lock().overflow_count(), 1);

        let report = extractor.tick(&ring, Duration::from_millis(5));
        assert!(report.resynced);
        // The drain saw the newest 40 samples that fit; the window holds the
        // first 10 of those.
        assert_eq!(extractor.samples(), &captured[10..20]);

        let ring = ring.lock();
        assert_eq!(ring.fill_count(), 0);
        assert_eq!(ring.overflow_count(), 0);
    }

    #[test]
    fn test_reset_clears_window() {
        let ring = Mutex::new(RingBuffer::new(80).unwrap());
        let mut extractor = FrameWindowExtractor::new(stereo(), 80);
        ring.lock().write(&samples_as_bytes(&[0.5; 20]));
        extractor.tick(&ring, Duration::from_millis(10));
        assert!(!extractor.samples().is_empty());

        extractor.reset();
        assert!(extractor.samples().is_empty());
        assert!(extractor.bytes().is_empty());
    }
}
