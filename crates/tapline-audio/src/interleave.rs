//! Strided channel-area copies.
//!
//! Backends hand over one [`ChannelArea`] per channel: a view that starts at
//! the channel's first sample and advances `step` bytes per frame. All index
//! arithmetic over those views lives here and is bounds-checked before any
//! byte is copied.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use tapline_core::{Error, Result};

/// One channel of backend-owned capture memory.
#[derive(Debug, Clone, Copy)]
pub struct ChannelArea<'a> {
    /// Bytes starting at this channel's first sample.
    pub data: &'a [u8],
    /// Distance in bytes between consecutive samples of this channel.
    pub step: usize,
}

impl<'a> ChannelArea<'a> {
    pub const fn new(data: &'a [u8], step: usize) -> Self {
        Self { data, step }
    }

    /// Bytes this area must span to hold `frames` samples of `sample_size`.
    const fn required_len(&self, sample_size: usize, frames: usize) -> usize {
        if frames == 0 {
            0
        } else {
            (frames - 1) * self.step + sample_size
        }
    }
}

/// Split one interleaved buffer into per-channel areas.
pub fn areas_from_interleaved(
    data: &[u8],
    channels: usize,
    sample_size: usize,
) -> Vec<ChannelArea<'_>> {
    let step = channels * sample_size;
    (0..channels)
        .map(|ch| ChannelArea::new(data.get(ch * sample_size..).unwrap_or(&[]), step))
        .collect()
}

fn validate(areas: &[ChannelArea<'_>], sample_size: usize, frames: usize) -> Result<()> {
    if areas.is_empty() {
        return Err(Error::ChannelArea("no channel areas".to_string()));
    }
    if sample_size == 0 {
        return Err(Error::ChannelArea("sample size must be nonzero".to_string()));
    }

    for (ch, area) in areas.iter().enumerate() {
        if frames > 1 && area.step < sample_size {
            return Err(Error::ChannelArea(format!(
                "channel {ch}: step {} is smaller than the sample size {sample_size}",
                area.step
            )));
        }
        let required = area.required_len(sample_size, frames);
        if area.data.len() < required {
            return Err(Error::ChannelArea(format!(
                "channel {ch}: {} bytes available, {required} needed for {frames} frames",
                area.data.len()
            )));
        }
    }

    Ok(())
}

/// Return the captured frames as one contiguous slice when the areas are
/// tightly packed and interleaved, i.e. channel `c` starts `c * sample_size`
/// bytes after channel 0 and every step equals one frame.
///
/// `Ok(None)` means the layout needs [`copy_interleaved`].
pub fn packed_span<'a>(
    areas: &[ChannelArea<'a>],
    sample_size: usize,
    frames: usize,
) -> Result<Option<&'a [u8]>> {
    validate(areas, sample_size, frames)?;

    let frame_size = areas.len() * sample_size;
    let base = areas[0].data.as_ptr() as usize;

    let packed = areas.iter().enumerate().all(|(ch, area)| {
        area.step == frame_size && area.data.as_ptr() as usize == base + ch * sample_size
    });

    if !packed {
        return Ok(None);
    }

    Ok(areas[0].data.get(..frames * frame_size))
}

/// Gather `frames` frames from possibly strided areas into `dest` as
/// contiguous interleaved samples. Returns the number of bytes written.
pub fn copy_interleaved(
    areas: &[ChannelArea<'_>],
    sample_size: usize,
    frames: usize,
    dest: &mut [u8],
) -> Result<usize> {
    validate(areas, sample_size, frames)?;

    let frame_size = areas.len() * sample_size;
    let total = frames * frame_size;
    if dest.len() < total {
        return Err(Error::ChannelArea(format!(
            "destination holds {} bytes, {total} needed",
            dest.len()
        )));
    }

    for (frame, out) in dest[..total].chunks_exact_mut(frame_size).enumerate() {
        for (area, sample) in areas.iter().zip(out.chunks_exact_mut(sample_size)) {
            let start = frame * area.step;
            sample.copy_from_slice(&area.data[start..start + sample_size]);
        }
    }

    Ok(total)
}
