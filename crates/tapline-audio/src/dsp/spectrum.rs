//! Windowed DFT spectrum over a sliding history of samples.
//!
//! The analyzer keeps the most recent `width` samples in a power-of-two
//! ring, applies a Blackman window and evaluates the first `width / 2` DFT
//! bins against precomputed cosine and sine tables. Tables cost
//! `width * width` floats, so widths stay small (a few hundred samples).

use std::f64::consts::TAU;

use tapline_core::{Error, Result};

use super::to_dbfs;

pub struct SpectrumAnalyzer {
    width: usize,
    history: Box<[f32]>,
    offset: usize,
    window: Box<[f32]>,
    /// Row `k` holds `cos(2πkn / width)` for each `n`.
    coeffs_re: Box<[f32]>,
    coeffs_im: Box<[f32]>,
    scratch: Box<[f32]>,
}

impl SpectrumAnalyzer {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn new(width: usize) -> Result<Self> {
        if width < 4 || !width.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "spectrum width must be a power of two >= 4, got {width}"
            )));
        }

        let last = (width - 1) as f64;
        let window = (0..width)
            .map(|n| {
                let x = TAU * n as f64 / last;
                (0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()) as f32
            })
            .collect();

        let bins = width / 2;
        let mut coeffs_re = Vec::with_capacity(bins * width);
        let mut coeffs_im = Vec::with_capacity(bins * width);
        for k in 0..bins {
            for n in 0..width {
                let phase = TAU * ((k * n) % width) as f64 / width as f64;
                coeffs_re.push(phase.cos() as f32);
                coeffs_im.push(phase.sin() as f32);
            }
        }

        Ok(Self {
            width,
            history: vec![0.0; width].into_boxed_slice(),
            offset: 0,
            window,
            coeffs_re: coeffs_re.into_boxed_slice(),
            coeffs_im: coeffs_im.into_boxed_slice(),
            scratch: vec![0.0; width].into_boxed_slice(),
        })
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of magnitude bins [`analyze`](Self::analyze) produces.
    pub const fn bins(&self) -> usize {
        self.width / 2
    }

    /// Centre frequency of `bin` in Hz.
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.width as f32
    }

    /// Append samples to the history, keeping only the newest `width`.
    pub fn push(&mut self, input: &[f32]) {
        let mask = self.width - 1;
        let mut rest = input;
        while !rest.is_empty() {
            let part = rest.len().min(self.width - self.offset);
            self.history[self.offset..self.offset + part].copy_from_slice(&rest[..part]);
            self.offset = (self.offset + part) & mask;
            rest = &rest[part..];
        }
    }

    /// The history, oldest sample first.
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = self.history.split_at(self.offset);
        older.iter().chain(newer).copied()
    }

    /// Write the magnitude of the first `width / 2` bins into `output`,
    /// scaling the input by `amp` before the window.
    pub fn analyze(&mut self, amp: f32, output: &mut [f32]) -> Result<()> {
        let bins = self.bins();
        if output.len() < bins {
            return Err(Error::InvalidArgument(format!(
                "spectrum output holds {} bins, need {bins}",
                output.len()
            )));
        }

        let mask = self.width - 1;
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            *slot = self.window[i] * amp * self.history[(self.offset + i) & mask];
        }

        for (k, out) in output[..bins].iter_mut().enumerate() {
            let row = k * self.width..(k + 1) * self.width;
            let (re, im) = self
                .scratch
                .iter()
                .zip(&self.coeffs_re[row.clone()])
                .zip(&self.coeffs_im[row])
                .fold((0.0_f32, 0.0_f32), |(re, im), ((x, c), s)| {
                    (x.mul_add(*c, re), (-x).mul_add(*s, im))
                });
            *out = re.hypot(im);
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.offset = 0;
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("width", &self.width)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// Convert magnitudes to dBFS in place.
pub fn to_decibels(spectrum: &mut [f32]) {
    for value in spectrum {
        *value = to_dbfs(*value);
    }
}

/// Index and magnitude of the strongest bin, skipping DC.
pub fn peak_bin(spectrum: &[f32]) -> Option<(usize, f32)> {
    spectrum
        .iter()
        .copied()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
