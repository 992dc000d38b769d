//! RMS level meter over a three-band filter bank.

use super::{to_dbfs, Bands, MultibandFilter};

/// Crossover frequency the meter uses unless retuned.
pub const DEFAULT_CROSSOVER_HZ: f32 = 960.0;

/// Filter Q the meter uses unless retuned.
pub const DEFAULT_Q: f32 = 0.15;

/// Per-band RMS level in dBFS, updated once per window.
///
/// Filter state carries over between windows so consecutive ticks measure a
/// continuous signal.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    filter: MultibandFilter,
    levels: Bands,
}

impl LevelMeter {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_crossover(sample_rate, DEFAULT_CROSSOVER_HZ, DEFAULT_Q)
    }

    pub fn with_crossover(sample_rate: u32, crossover_hz: f32, q: f32) -> Self {
        let mut meter = Self {
            filter: MultibandFilter::default(),
            levels: Bands::splat(to_dbfs(0.0)),
        };
        meter.set_crossover(sample_rate, crossover_hz, q);
        meter
    }

    pub fn set_crossover(&mut self, sample_rate: u32, crossover_hz: f32, q: f32) {
        #[allow(clippy::cast_precision_loss)]
        let fc = crossover_hz / sample_rate.max(1) as f32;
        self.filter.set_parameter(fc, q);
    }

    /// Measure one mono window and return its band levels in dBFS.
    ///
    /// An empty window reports the silence floor.
    pub fn process(&mut self, samples: &[f32]) -> Bands {
        self.process_iter(samples.iter().copied())
    }

    /// Same as [`process`](Self::process) for samples produced lazily, such
    /// as one channel of an interleaved window.
    pub fn process_iter(&mut self, samples: impl IntoIterator<Item = f32>) -> Bands {
        let mut square_sum = Bands::default();
        let mut count = 0_usize;

        for sample in samples {
            let bands = self.filter.feed(sample);
            square_sum = square_sum.zip(bands, |acc, v| v.mul_add(v, acc));
            count += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = count.max(1) as f32;
        self.levels = square_sum.map(|ss| to_dbfs((ss / n).sqrt()));
        self.levels
    }

    pub const fn levels(&self) -> Bands {
        self.levels
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.levels = Bands::splat(to_dbfs(0.0));
    }
}

/// Map a dBFS level onto a `[0, 1]` meter length covering `range_db`
/// decibels below full scale.
pub fn meter_scale(level_db: f32, range_db: f32) -> f32 {
    if range_db <= 0.0 {
        return 0.0;
    }
    ((range_db + level_db).max(0.0) / range_db).min(1.0)
}
