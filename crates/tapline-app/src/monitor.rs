//! Per-tick analysis of the last frame window.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use tapline_audio::dsp::{
    extract_channel, meter_scale, peak_bin, to_decibels, Bands, LevelMeter, SpectrumAnalyzer,
    Timecode, TimecodeDecoder,
};
use tapline_core::{Result, StreamFormat};

/// What one window looked like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub frames: usize,
    /// Band levels of the first channel in dBFS.
    pub levels: Bands,
    /// Meter bar lengths for `levels`.
    pub meter: Bands,
    /// Strongest spectrum bin as (Hz, dBFS).
    pub peak: Option<(f32, f32)>,
    pub timecode: Option<Timecode>,
}

pub struct Monitor {
    channel_count: usize,
    sample_rate: u32,
    meter_range_db: f32,
    meter: LevelMeter,
    spectrum: SpectrumAnalyzer,
    bins: Vec<f32>,
    mono: Vec<f32>,
    ltc: Option<(usize, TimecodeDecoder)>,
}

impl Monitor {
    pub fn new(
        format: &StreamFormat,
        spectrum_width: usize,
        meter_range_db: f32,
        ltc_channel: Option<usize>,
    ) -> Result<Self> {
        let spectrum = SpectrumAnalyzer::new(spectrum_width)?;
        Ok(Self {
            channel_count: usize::from(format.channel_count),
            sample_rate: format.sample_rate,
            meter_range_db,
            meter: LevelMeter::new(format.sample_rate),
            bins: vec![0.0; spectrum.bins()],
            spectrum,
            mono: Vec::new(),
            ltc: ltc_channel.map(|channel| (channel, TimecodeDecoder::new())),
        })
    }

    /// Analyse one interleaved window.
    pub fn process(&mut self, samples: &[f32]) -> Result<Reading> {
        extract_channel(samples, self.channel_count, 0, &mut self.mono)?;

        let levels = self.meter.process(&self.mono);
        let range = self.meter_range_db;

        self.spectrum.push(&self.mono);
        self.spectrum.analyze(1.0, &mut self.bins)?;
        to_decibels(&mut self.bins);
        let peak = peak_bin(&self.bins)
            .map(|(bin, db)| (self.spectrum.bin_frequency(bin, self.sample_rate), db));

        let timecode = match &mut self.ltc {
            Some((channel, decoder)) => {
                extract_channel(samples, self.channel_count, *channel, &mut self.mono)?;
                decoder.parse(&self.mono);
                decoder.last_timecode()
            }
            None => None,
        };

        Ok(Reading {
            frames: samples.len() / self.channel_count.max(1),
            levels,
            meter: levels.map(|db| meter_scale(db, range)),
            peak,
            timecode,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use approx::assert_relative_eq;

    fn stereo_tone(freq: f32, sample_rate: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|n| {
                let x = (2.0 * PI * freq * n as f32 / sample_rate).sin();
                [x, 0.0]
            })
            .collect()
    }

    #[test]
    fn test_reading_of_full_scale_tone() {
        let format = StreamFormat::new(2, 48000, 1.0 / 60.0);
        let mut monitor = Monitor::new(&format, 256, 60.0, None).unwrap();

        // 3000 Hz sits exactly on bin 16 of a 256-point analysis at 48 kHz.
        let reading = monitor.process(&stereo_tone(3000.0, 48000.0, 4800)).unwrap();

        assert_eq!(reading.frames, 4800);
        assert_relative_eq!(reading.levels.bypass, 0.0, epsilon = 0.05);
        assert_relative_eq!(reading.meter.bypass, 1.0, epsilon = 1e-3);
        let (hz, _) = reading.peak.unwrap();
        assert_relative_eq!(hz, 3000.0, epsilon = 1e-2);
        assert_eq!(reading.timecode, None);
    }

    #[test]
    fn test_empty_window() {
        let format = StreamFormat::new(2, 48000, 1.0 / 60.0);
        let mut monitor = Monitor::new(&format, 64, 60.0, Some(1)).unwrap();
        let reading = monitor.process(&[]).unwrap();
        assert_eq!(reading.frames, 0);
        assert_relative_eq!(reading.meter.bypass, 0.0);
        assert_eq!(reading.timecode, None);
    }

    #[test]
    fn test_bad_spectrum_width() {
        let format = StreamFormat::default();
        assert!(Monitor::new(&format, 100, 60.0, None).is_err());
    }
}
