//! Synthetic capture backend producing sine tones on a paced thread.
//!
//! Used by the demo binary and tests in place of a hardware device. Blocks
//! are delivered at real-time pace through the same callback contract a
//! device backend uses, including optional null (zero-fill) regions.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tapline_core::{Error, Result, StreamFormat, BYTES_PER_SAMPLE};
use tracing::{debug, error};

use crate::interleave::ChannelArea;
use crate::stream::{CaptureBackend, StreamHandler, MAX_CHANNELS};

/// Parameters of the generated signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToneSettings {
    pub channel_count: u16,
    pub sample_rate: u32,
    /// Tone frequency per channel in Hz; reused cyclically.
    pub frequencies: Vec<f64>,
    /// Peak amplitude in full-scale units.
    pub amplitude: f32,
    /// Frames delivered per callback.
    pub block_frames: usize,
    /// Deliver every n-th block as a null region; 0 disables.
    pub null_block_every: u32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 48000,
            frequencies: vec![440.0, 1000.0],
            amplitude: 0.5,
            block_frames: 256,
            null_block_every: 0,
        }
    }
}

impl ToneSettings {
    fn validate(&self) -> Result<()> {
        let channels = usize::from(self.channel_count);
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::Backend(format!(
                "tone backend supports 1..={MAX_CHANNELS} channels, got {channels}"
            )));
        }
        if self.sample_rate == 0 || self.block_frames == 0 {
            return Err(Error::Backend(
                "tone backend needs a nonzero sample rate and block size".to_string(),
            ));
        }
        if self.frequencies.is_empty() {
            return Err(Error::Backend("tone backend needs at least one frequency".into()));
        }
        Ok(())
    }

    fn block_duration(&self) -> f64 {
        self.block_frames as f64 / f64::from(self.sample_rate)
    }
}

/// Backend generating sine tones at real-time pace.
pub struct ToneBackend {
    settings: ToneSettings,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ToneBackend {
    pub fn new(settings: ToneSettings) -> Self {
        Self {
            settings,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub const fn settings(&self) -> &ToneSettings {
        &self.settings
    }
}

impl CaptureBackend for ToneBackend {
    fn open(&mut self, requested_latency: f64) -> Result<StreamFormat> {
        self.settings.validate()?;
        Ok(StreamFormat::new(
            self.settings.channel_count,
            self.settings.sample_rate,
            requested_latency.max(self.settings.block_duration()),
        ))
    }

    fn start(&mut self, handler: StreamHandler) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::Backend("tone backend already started".to_string()));
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let settings = self.settings.clone();

        let worker = std::thread::Builder::new()
            .name("tone-backend".to_string())
            .spawn(move || ToneWorker::new(settings, handler).run(&running))
            .map_err(|e| Error::Backend(format!("Failed to spawn tone thread: {e}")))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Tone backend thread panicked");
            }
            debug!("Tone backend stopped");
        }
    }

    fn name(&self) -> &str {
        "tone backend"
    }
}

impl Drop for ToneBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ToneWorker {
    settings: ToneSettings,
    handler: StreamHandler,
    block: Vec<f32>,
    phases: Vec<f64>,
}

impl ToneWorker {
    fn new(settings: ToneSettings, handler: StreamHandler) -> Self {
        let channels = usize::from(settings.channel_count);
        Self {
            block: vec![0.0; settings.block_frames * channels],
            phases: vec![0.0; channels],
            settings,
            handler,
        }
    }

    fn run(mut self, running: &AtomicBool) {
        let period = Duration::from_secs_f64(self.settings.block_duration());
        let mut deadline = Instant::now();
        let mut blocks: u64 = 0;

        while running.load(Ordering::Acquire) {
            blocks += 1;
            let every = u64::from(self.settings.null_block_every);

            if every > 0 && blocks % every == 0 {
                self.advance_phases();
                self.handler.on_read(self.settings.block_frames, None);
            } else {
                self.render();
                self.deliver();
            }

            deadline += period;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else if now - deadline > period * 4 {
                // Fell far behind; resume pacing from now.
                deadline = now;
            }
        }
    }

    fn render(&mut self) {
        let channels = self.phases.len();
        let rate = f64::from(self.settings.sample_rate);

        for frame in self.block.chunks_exact_mut(channels) {
            for (ch, (sample, phase)) in frame.iter_mut().zip(&mut self.phases).enumerate() {
                *sample = self.settings.amplitude * phase.sin() as f32;
                let freq = self.settings.frequencies[ch % self.settings.frequencies.len()];
                *phase = (*phase + TAU * freq / rate) % TAU;
            }
        }
    }

    fn advance_phases(&mut self) {
        let rate = f64::from(self.settings.sample_rate);
        let frames = self.settings.block_frames as f64;
        for (ch, phase) in self.phases.iter_mut().enumerate() {
            let freq = self.settings.frequencies[ch % self.settings.frequencies.len()];
            *phase = (*phase + TAU * freq * frames / rate) % TAU;
        }
    }

    fn deliver(&mut self) {
        let channels = self.phases.len();
        let bytes: &[u8] = bytemuck::cast_slice(&self.block);
        let step = channels * BYTES_PER_SAMPLE;

        let mut areas = [ChannelArea::new(&[], 0); MAX_CHANNELS];
        for (ch, area) in areas.iter_mut().take(channels).enumerate() {
            *area = ChannelArea::new(&bytes[ch * BYTES_PER_SAMPLE..], step);
        }

        self.handler
            .on_read(self.settings.block_frames, Some(&areas[..channels]));
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::stream::InputStream;
    use tapline_core::CaptureConfig;

    fn open_stream(settings: ToneSettings) -> InputStream {
        InputStream::open(
            Box::new(ToneBackend::new(settings)),
            &CaptureConfig::default(),
        )
        .unwrap()
    }

    /// Tick in small steps until the window holds audio.
    fn next_window(stream: &mut InputStream) -> Vec<f32> {
        for _ in 0..400 {
            std::thread::sleep(Duration::from_millis(5));
            stream.update_with_elapsed(Duration::from_millis(5));
            if !stream.last_frame_samples().is_empty() {
                return stream.last_frame_samples().to_vec();
            }
        }
        Vec::new()
    }

    #[test]
    fn test_tone_reaches_consumer() {
        let mut stream = open_stream(ToneSettings {
            frequencies: vec![440.0],
            amplitude: 0.5,
            ..ToneSettings::default()
        });

        let window = next_window(&mut stream);
        assert!(!window.is_empty());
        assert_eq!(window.len() % 2, 0);
        assert!(window.iter().all(|x| x.abs() <= 0.5 + 1e-6));
        assert!(window.iter().any(|x| x.abs() > 0.4));

        stream.close();
        assert!(!stream.is_valid());
    }

    #[test]
    fn test_null_blocks_arrive_as_silence() {
        let mut stream = open_stream(ToneSettings {
            null_block_every: 1,
            ..ToneSettings::default()
        });

        let window = next_window(&mut stream);
        assert!(!window.is_empty());
        assert!(window.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_open_reports_block_latency() {
        let mut backend = ToneBackend::new(ToneSettings {
            sample_rate: 1000,
            block_frames: 50,
            ..ToneSettings::default()
        });
        let format = backend.open(0.01).unwrap();
        assert_eq!(format.channel_count, 2);
        assert!((format.software_latency - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut backend = ToneBackend::new(ToneSettings {
            channel_count: 0,
            ..ToneSettings::default()
        });
        assert!(backend.open(0.01).is_err());

        let mut backend = ToneBackend::new(ToneSettings {
            frequencies: Vec::new(),
            ..ToneSettings::default()
        });
        assert!(backend.open(0.01).is_err());
    }

    #[test]
    fn test_stop_without_start() {
        let mut backend = ToneBackend::new(ToneSettings::default());
        backend.stop();
        backend.stop();
    }
}
