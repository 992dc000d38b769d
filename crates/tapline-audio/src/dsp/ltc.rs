//! Linear timecode (LTC) frames and a biphase-mark decoder.
//!
//! An LTC frame is 80 bits: 64 data bits carrying BCD time fields (first
//! transmitted bit in the LSB), followed by the 16-bit sync word.

use std::fmt;

/// Sync word closing every LTC frame, first transmitted bit in the LSB.
pub const SYNC_WORD: u16 = 0xBFFC;

const DROP_FRAME_BIT: u64 = 0x400;

/// Decoded time address of one LTC frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timecode {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub frame: u8,
    pub drop_frame: bool,
}

/// Units nibble plus a tens field of `tens_mask` width at bit 8.
#[allow(clippy::cast_possible_truncation)]
const fn unpack_bcd(group: u64, tens_mask: u64) -> u8 {
    ((group & 0xf) + ((group >> 8) & tens_mask) * 10) as u8
}

const fn pack_bcd(value: u8, tens_mask: u64) -> u64 {
    (value as u64 % 10) | (((value as u64 / 10) & tens_mask) << 8)
}

impl Timecode {
    pub const fn new(hour: u8, minute: u8, second: u8, frame: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            frame,
            drop_frame: false,
        }
    }

    /// Extract the time fields from the 64 data bits of a frame.
    ///
    /// User bits and flags other than drop-frame are ignored.
    pub const fn unpack(data: u64) -> Self {
        let frames = data & 0xffff;
        let seconds = (data >> 16) & 0xffff;
        let minutes = (data >> 32) & 0xffff;
        let hours = (data >> 48) & 0xffff;

        Self {
            frame: unpack_bcd(frames, 3),
            second: unpack_bcd(seconds, 7),
            minute: unpack_bcd(minutes, 7),
            hour: unpack_bcd(hours, 3),
            drop_frame: frames & DROP_FRAME_BIT != 0,
        }
    }

    /// Encode the time fields into the 64 data bits of a frame, with all
    /// user bits cleared. Fields wider than their BCD slots are truncated.
    pub const fn pack(self) -> u64 {
        let mut frames = pack_bcd(self.frame, 3);
        if self.drop_frame {
            frames |= DROP_FRAME_BIT;
        }
        frames
            | (pack_bcd(self.second, 7) << 16)
            | (pack_bcd(self.minute, 7) << 32)
            | (pack_bcd(self.hour, 3) << 48)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hour, self.minute, self.second, self.frame
        )
    }
}

/// Stream decoder turning LTC audio into [`Timecode`] values.
///
/// Samples are reduced to their sign, transitions are classified as half or
/// full bit periods against an adaptive estimate, and decoded bits shift
/// through a 128-bit FIFO. A frame is reported once its sync word has moved
/// 48 bits past the tail of the FIFO, which puts the preceding 64 data bits
/// in the low half.
#[derive(Debug, Clone, Default)]
pub struct TimecodeDecoder {
    fifo_lo: u64,
    fifo_hi: u64,
    /// Samples since the last transition, saturating.
    count: u32,
    /// Bit period estimate in hundredths of a sample.
    period: u32,
    /// First half of a "1" bit seen.
    tick: bool,
    state: bool,
    last: Option<Timecode>,
    decoded: u64,
}

const COUNT_LIMIT: u32 = 10_000;

impl TimecodeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed mono samples.
    pub fn parse(&mut self, samples: &[f32]) {
        self.parse_iter(samples.iter().copied());
    }

    /// Feed samples produced lazily, such as one channel of an interleaved
    /// window.
    pub fn parse_iter(&mut self, samples: impl IntoIterator<Item = f32>) {
        for sample in samples {
            self.process_sample(sample > 0.0);
        }
    }

    /// Most recently decoded frame, if any.
    pub const fn last_timecode(&self) -> Option<Timecode> {
        self.last
    }

    /// Frames decoded since creation or the last reset.
    pub const fn frames_decoded(&self) -> u64 {
        self.decoded
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn process_sample(&mut self, sample: bool) {
        if self.state == sample {
            if self.count < COUNT_LIMIT {
                self.count += 1;
            }
            return;
        }

        if self.count < self.period / 100 {
            // Half period: a "1" spans two of these.
            if self.tick {
                self.process_bit(true);
                self.tick = false;
            } else {
                self.tick = true;
            }
        } else {
            self.process_bit(false);
            self.tick = false;
        }

        self.period = (self.period * 99 + self.count * 100) / 100;
        self.state = sample;
        self.count = 0;
    }

    fn process_bit(&mut self, bit: bool) {
        const MSB: u64 = 1 << 63;

        let carry = self.fifo_hi & 1 != 0;
        self.fifo_lo = (self.fifo_lo >> 1) | if carry { MSB } else { 0 };
        self.fifo_hi = (self.fifo_hi >> 1) | if bit { MSB } else { 0 };

        if self.fifo_hi & 0xffff == u64::from(SYNC_WORD) {
            self.last = Some(Timecode::unpack(self.fifo_lo));
            self.decoded += 1;
        }
    }
}
