//! Biquad IIR filters (transposed direct form II).
//!
//! Cutoff frequencies are normalised to the sample rate (`hz / sample_rate`),
//! so one set of coefficients works for any stream once the caller divides.

use std::f32::consts::PI;

/// Single second-order section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadFilter {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

/// Prewarped `K` and the shared normalisation term.
fn prewarp(fc: f32, q: f32) -> (f32, f32) {
    let k = (PI * fc).tan();
    let norm = 1.0 / (1.0 + k / q + k * k);
    (k, norm)
}

impl BiquadFilter {
    pub fn lowpass(fc: f32, q: f32) -> Self {
        let mut filter = Self::default();
        filter.set_lowpass(fc, q);
        filter
    }

    pub fn bandpass(fc: f32, q: f32) -> Self {
        let mut filter = Self::default();
        filter.set_bandpass(fc, q);
        filter
    }

    pub fn highpass(fc: f32, q: f32) -> Self {
        let mut filter = Self::default();
        filter.set_highpass(fc, q);
        filter
    }

    /// Reconfigure as a low-pass. Filter state is kept.
    pub fn set_lowpass(&mut self, fc: f32, q: f32) {
        let (k, norm) = prewarp(fc, q);
        self.a0 = k * k * norm;
        self.a1 = 2.0 * self.a0;
        self.a2 = self.a0;
        self.set_feedback(k, q, norm);
    }

    /// Reconfigure as a band-pass. Filter state is kept.
    pub fn set_bandpass(&mut self, fc: f32, q: f32) {
        let (k, norm) = prewarp(fc, q);
        self.a0 = k / q * norm;
        self.a1 = 0.0;
        self.a2 = -self.a0;
        self.set_feedback(k, q, norm);
    }

    /// Reconfigure as a high-pass. Filter state is kept.
    pub fn set_highpass(&mut self, fc: f32, q: f32) {
        let (k, norm) = prewarp(fc, q);
        self.a0 = norm;
        self.a1 = -2.0 * self.a0;
        self.a2 = self.a0;
        self.set_feedback(k, q, norm);
    }

    fn set_feedback(&mut self, k: f32, q: f32, norm: f32) {
        self.b1 = 2.0 * (k * k - 1.0) * norm;
        self.b2 = (1.0 - k / q + k * k) * norm;
    }

    /// Filter one sample.
    pub fn feed(&mut self, input: f32) -> f32 {
        let output = input * self.a0 + self.z1;
        self.z1 = input * self.a1 + self.z2 - self.b1 * output;
        self.z2 = input * self.a2 - self.b2 * output;
        output
    }

    /// Clear the delay line.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// One input sample split into the unfiltered signal and three bands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bands {
    pub bypass: f32,
    pub low: f32,
    pub band: f32,
    pub high: f32,
}

impl Bands {
    pub const fn splat(value: f32) -> Self {
        Self {
            bypass: value,
            low: value,
            band: value,
            high: value,
        }
    }

    #[must_use]
    pub fn map(self, mut f: impl FnMut(f32) -> f32) -> Self {
        Self {
            bypass: f(self.bypass),
            low: f(self.low),
            band: f(self.band),
            high: f(self.high),
        }
    }

    #[must_use]
    pub fn zip(self, other: Self, mut f: impl FnMut(f32, f32) -> f32) -> Self {
        Self {
            bypass: f(self.bypass, other.bypass),
            low: f(self.low, other.low),
            band: f(self.band, other.band),
            high: f(self.high, other.high),
        }
    }

    pub const fn to_array(self) -> [f32; 4] {
        [self.bypass, self.low, self.band, self.high]
    }
}

/// Low/band/high filter bank sharing one crossover frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MultibandFilter {
    low: BiquadFilter,
    band: BiquadFilter,
    high: BiquadFilter,
}

impl MultibandFilter {
    pub fn new(fc: f32, q: f32) -> Self {
        let mut filter = Self::default();
        filter.set_parameter(fc, q);
        filter
    }

    /// Retune all three sections. Filter state is kept.
    pub fn set_parameter(&mut self, fc: f32, q: f32) {
        self.low.set_lowpass(fc, q);
        self.band.set_bandpass(fc, q);
        self.high.set_highpass(fc, q);
    }

    pub fn feed(&mut self, input: f32) -> Bands {
        Bands {
            bypass: input,
            low: self.low.feed(input),
            band: self.band.feed(input),
            high: self.high.feed(input),
        }
    }

    pub fn reset(&mut self) {
        self.low.reset();
        self.band.reset();
        self.high.reset();
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settle(filter: &mut BiquadFilter, input: f32, count: usize) -> f32 {
        (0..count).fold(0.0, |_, _| filter.feed(input))
    }

    fn sine_rms(filter: &mut BiquadFilter, freq: f32, count: usize) -> f32 {
        // Skip the transient, then measure.
        let mut ss = 0.0;
        for n in 0..count * 2 {
            let y = filter.feed((2.0 * PI * freq * n as f32).sin());
            if n >= count {
                ss += y * y;
            }
        }
        (ss / count as f32).sqrt()
    }

    #[test]
    fn test_dc_response() {
        assert_relative_eq!(
            settle(&mut BiquadFilter::lowpass(0.02, 0.707), 1.0, 4000),
            1.0,
            epsilon = 1e-3
        );
        assert_relative_eq!(
            settle(&mut BiquadFilter::highpass(0.02, 0.707), 1.0, 4000),
            0.0,
            epsilon = 1e-3
        );
        assert_relative_eq!(
            settle(&mut BiquadFilter::bandpass(0.02, 0.707), 1.0, 4000),
            0.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_lowpass_attenuates_high_tones() {
        let pass = sine_rms(&mut BiquadFilter::lowpass(0.05, 0.707), 0.005, 2000);
        let stop = sine_rms(&mut BiquadFilter::lowpass(0.05, 0.707), 0.25, 2000);
        assert!(pass > 0.6, "passband rms {pass}");
        assert!(stop < 0.05, "stopband rms {stop}");
    }

    #[test]
    fn test_highpass_attenuates_low_tones() {
        let stop = sine_rms(&mut BiquadFilter::highpass(0.05, 0.707), 0.002, 4000);
        let pass = sine_rms(&mut BiquadFilter::highpass(0.05, 0.707), 0.25, 4000);
        assert!(pass > 0.6, "passband rms {pass}");
        assert!(stop < 0.05, "stopband rms {stop}");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = BiquadFilter::lowpass(0.1, 0.707);
        settle(&mut filter, 1.0, 100);
        filter.reset();
        assert_eq!(filter.feed(0.0), 0.0);
    }

    #[test]
    fn test_multiband_bypass_is_identity() {
        let mut filter = MultibandFilter::new(0.02, 0.15);
        for x in [0.5, -0.25, 1.0, 0.0] {
            assert_eq!(filter.feed(x).bypass, x);
        }
    }

    #[test]
    fn test_bands_helpers() {
        let a = Bands::splat(2.0);
        let b = a.map(|v| v * v).zip(Bands::splat(1.0), |x, y| x - y);
        assert_eq!(b.to_array(), [3.0; 4]);
    }
}
