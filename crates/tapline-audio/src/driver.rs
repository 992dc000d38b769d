//! Explicit capture context ticked by the host application.
//!
//! Owns every open [`InputStream`] behind a small integer handle, updates
//! them once per host tick and drops streams whose backend has failed.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tapline_core::{CaptureConfig, Error, Result, StreamError};
use tracing::{debug, info, warn};

use crate::stream::{CaptureBackend, InputStream};

/// Handle to a stream owned by a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// A stream removed during [`Driver::update`] because it became invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrunedStream {
    pub id: StreamId,
    pub fault: Option<StreamError>,
}

/// Capture context owning all open input streams.
pub struct Driver {
    config: CaptureConfig,
    streams: BTreeMap<StreamId, InputStream>,
    next_id: u32,
    last_update: Instant,
}

impl Driver {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            streams: BTreeMap::new(),
            next_id: 0,
            last_update: Instant::now(),
        })
    }

    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Open a stream on `backend` and register it.
    ///
    /// Nothing is registered when the stream fails to start. The first
    /// stream restarts the tick clock so its first window covers only the
    /// time since it opened.
    pub fn open_stream(&mut self, backend: Box<dyn CaptureBackend>) -> Result<StreamId> {
        let stream = InputStream::open(backend, &self.config)?;
        if self.streams.is_empty() {
            self.last_update = Instant::now();
        }

        let id = StreamId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| Error::Internal("stream handles exhausted".to_string()))?;

        info!("Registered {id}");
        self.streams.insert(id, stream);
        Ok(id)
    }

    pub fn stream(&self, id: StreamId) -> Option<&InputStream> {
        self.streams.get(&id)
    }

    /// Close and release one stream.
    pub fn close_stream(&mut self, id: StreamId) -> Result<()> {
        let mut stream = self
            .streams
            .remove(&id)
            .ok_or(Error::UnknownStream(id.0))?;
        stream.close();
        debug!("Closed {id}");
        Ok(())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.streams.keys().copied()
    }

    /// Tick every stream using the wall-clock time since the previous tick.
    pub fn update(&mut self) -> Vec<PrunedStream> {
        let elapsed = self.last_update.elapsed();
        self.update_with_elapsed(elapsed)
    }

    /// Tick every valid stream with `elapsed`, then drop the ones that are
    /// no longer valid.
    pub fn update_with_elapsed(&mut self, elapsed: Duration) -> Vec<PrunedStream> {
        self.last_update = Instant::now();

        for stream in self.streams.values_mut() {
            if stream.is_valid() {
                stream.update_with_elapsed(elapsed);
            }
        }

        let invalid: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, stream)| !stream.is_valid())
            .map(|(id, _)| *id)
            .collect();

        invalid
            .into_iter()
            .filter_map(|id| self.streams.remove(&id).map(|stream| (id, stream)))
            .map(|(id, stream)| {
                let fault = stream.fault();
                match fault {
                    Some(e) => warn!("Dropping {id}: {e}"),
                    None => warn!("Dropping {id}: stream closed"),
                }
                PrunedStream { id, fault }
            })
            .collect()
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("streams", &self.streams.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tapline_core::StreamFormat;

    use super::*;
    use crate::backend::{ToneBackend, ToneSettings};
    use crate::stream::StreamHandler;

    type Slot = Arc<Mutex<Option<StreamHandler>>>;

    /// Backend that hands its handler to the test instead of a device.
    struct ManualBackend {
        slot: Slot,
        fail_start: bool,
    }

    impl CaptureBackend for ManualBackend {
        fn open(&mut self, requested_latency: f64) -> Result<StreamFormat> {
            Ok(StreamFormat::new(1, 1000, requested_latency))
        }

        fn start(&mut self, handler: StreamHandler) -> Result<()> {
            if self.fail_start {
                return Err(Error::Backend("no device".into()));
            }
            *self.slot.lock() = Some(handler);
            Ok(())
        }

        fn stop(&mut self) {
            self.slot.lock().take();
        }
    }

    fn manual(fail_start: bool) -> (Box<ManualBackend>, Slot) {
        let slot = Slot::default();
        let backend = Box::new(ManualBackend {
            slot: Arc::clone(&slot),
            fail_start,
        });
        (backend, slot)
    }

    #[test]
    fn test_open_and_close_streams() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        let (a, slot_a) = manual(false);
        let (b, _slot_b) = manual(false);

        let first = driver.open_stream(a).unwrap();
        let second = driver.open_stream(b).unwrap();
        assert_ne!(first, second);
        assert_eq!(driver.stream_count(), 2);
        assert_eq!(driver.ids().collect::<Vec<_>>(), vec![first, second]);

        driver.close_stream(first).unwrap();
        assert!(slot_a.lock().is_none());
        assert!(driver.stream(first).is_none());
        assert!(driver.stream(second).is_some());
    }

    #[test]
    fn test_first_stream_restarts_tick_clock() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        let created = driver.last_update;
        std::thread::sleep(Duration::from_millis(2));

        let (first, _slot_first) = manual(false);
        driver.open_stream(first).unwrap();
        let opened = driver.last_update;
        assert!(opened > created);

        // Later streams join the running clock.
        std::thread::sleep(Duration::from_millis(2));
        let (second, _slot_second) = manual(false);
        driver.open_stream(second).unwrap();
        assert_eq!(driver.last_update, opened);
    }

    #[test]
    fn test_failed_start_registers_nothing() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        let (backend, slot) = manual(true);
        assert!(matches!(
            driver.open_stream(backend),
            Err(Error::StreamOpen(_))
        ));
        assert_eq!(driver.stream_count(), 0);
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_update_prunes_failed_streams() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        let (bad, bad_slot) = manual(false);
        let (good, _good_slot) = manual(false);
        let bad_id = driver.open_stream(bad).unwrap();
        let good_id = driver.open_stream(good).unwrap();

        bad_slot
            .lock()
            .as_ref()
            .unwrap()
            .on_error(StreamError::Disconnected);

        let pruned = driver.update_with_elapsed(Duration::from_millis(10));
        assert_eq!(
            pruned,
            vec![PrunedStream {
                id: bad_id,
                fault: Some(StreamError::Disconnected),
            }]
        );
        assert_eq!(driver.ids().collect::<Vec<_>>(), vec![good_id]);
        // Dropping the stream stopped its backend.
        assert!(bad_slot.lock().is_none());
        assert!(driver.update_with_elapsed(Duration::ZERO).is_empty());
    }

    #[test]
    fn test_ticks_reach_streams() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        let (backend, slot) = manual(false);
        let id = driver.open_stream(backend).unwrap();

        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&samples);
        let areas = crate::interleave::areas_from_interleaved(bytes, 1, 4);
        slot.lock().as_mut().unwrap().on_read(10, Some(&areas));

        driver.update_with_elapsed(Duration::from_millis(10));
        assert_eq!(driver.stream(id).unwrap().last_frame_samples(), &samples[..]);
    }

    #[test]
    fn test_tone_stream_lifecycle() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        let id = driver
            .open_stream(Box::new(ToneBackend::new(ToneSettings::default())))
            .unwrap();

        let mut captured = false;
        for _ in 0..400 {
            std::thread::sleep(Duration::from_millis(5));
            assert!(driver.update_with_elapsed(Duration::from_millis(5)).is_empty());
            if !driver.stream(id).unwrap().last_frame_samples().is_empty() {
                captured = true;
                break;
            }
        }
        assert!(captured);

        driver.close_stream(id).unwrap();
        assert_eq!(driver.stream_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CaptureConfig {
            buffered_ticks: 0,
            ..CaptureConfig::default()
        };
        assert!(matches!(Driver::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_close_unknown_stream() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        assert!(matches!(
            driver.close_stream(StreamId(7)),
            Err(Error::UnknownStream(7))
        ));
    }

    #[test]
    fn test_update_without_streams() {
        let mut driver = Driver::new(CaptureConfig::default()).unwrap();
        assert!(driver.update().is_empty());
        assert_eq!(driver.stream_count(), 0);
    }

    #[test]
    fn test_stream_id_display() {
        assert_eq!(StreamId(3).to_string(), "stream#3");
    }
}
