//! Fixed-capacity byte ring buffer for audio capture.
//!
//! The backend callback thread writes incoming frames and the per-tick
//! consumer drains them. Fill and free counts are derived from two
//! monotonic 64-bit counters rather than from the wrapped offsets, so a
//! completely full buffer can never be mistaken for an empty one.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use tapline_core::{Error, Result};
use tracing::warn;

/// Single-producer, single-consumer circular byte store.
///
/// Never allocates after construction and every operation runs in time
/// proportional to the bytes it copies.
#[derive(Debug)]
pub struct RingBuffer {
    /// The underlying buffer storage.
    buffer: Box<[u8]>,
    /// Buffer capacity in bytes.
    capacity: usize,
    /// Total bytes ever written.
    write_count: u64,
    /// Total bytes ever read.
    read_count: u64,
    /// Writes that did not fit since the last clear.
    overflow_count: u64,
    /// Bytes discarded by those writes.
    dropped_bytes: u64,
}

impl RingBuffer {
    /// Create a new ring buffer holding `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "ring buffer capacity must be nonzero".to_string(),
            ));
        }

        Ok(Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            write_count: 0,
            read_count: 0,
            overflow_count: 0,
            dropped_bytes: 0,
        })
    }

    /// Get the buffer capacity in bytes.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub const fn fill_count(&self) -> usize {
        (self.write_count - self.read_count) as usize
    }

    /// Bytes that can be written without overflowing.
    pub const fn free_count(&self) -> usize {
        self.capacity() - self.fill_count()
    }

    /// Number of overflowing writes since the last [`clear`](Self::clear).
    pub const fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Bytes discarded by overflow since the last [`clear`](Self::clear).
    pub const fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    pub const fn is_empty(&self) -> bool {
        self.fill_count() == 0
    }

    pub const fn is_full(&self) -> bool {
        self.free_count() == 0
    }

    const fn read_offset(&self) -> usize {
        (self.read_count % self.capacity as u64) as usize
    }

    const fn write_offset(&self) -> usize {
        (self.write_count % self.capacity as u64) as usize
    }

    /// Write bytes to the buffer.
    ///
    /// When `data` does not fit, only its most recent `free_count` bytes are
    /// stored and the overflow is recorded. Returns the number of bytes
    /// actually stored.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let free = self.free_count();

        if data.len() > free {
            let dropped = data.len() - free;
            self.record_overflow(dropped);
            warn!(
                "Ring buffer overflow: dropped {} of {} bytes",
                dropped,
                data.len()
            );
        }

        if free == 0 {
            return 0;
        }

        let data = &data[data.len().saturating_sub(free)..];
        let offset = self.write_offset();
        let tail = self.capacity() - offset;

        if data.len() <= tail {
            // Contiguous write
            self.buffer[offset..offset + data.len()].copy_from_slice(data);
        } else {
            // Wrap-around write
            let (first, second) = data.split_at(tail);
            self.buffer[offset..].copy_from_slice(first);
            self.buffer[..second.len()].copy_from_slice(second);
        }

        self.write_count += data.len() as u64;
        data.len()
    }

    /// Append `length` zero bytes.
    ///
    /// The caller must have clamped `length` to [`free_count`](Self::free_count);
    /// release builds silently truncate anything beyond it.
    pub fn write_empty(&mut self, length: usize) {
        debug_assert!(
            length <= self.free_count(),
            "write_empty({length}) exceeds free count {}",
            self.free_count()
        );
        let length = length.min(self.free_count());

        let offset = self.write_offset();
        let tail = self.capacity() - offset;

        if length <= tail {
            self.buffer[offset..offset + length].fill(0);
        } else {
            self.buffer[offset..].fill(0);
            self.buffer[..length - tail].fill(0);
        }

        self.write_count += length as u64;
    }

    /// Read exactly `output.len()` bytes from the buffer.
    ///
    /// The caller must have checked [`fill_count`](Self::fill_count) first;
    /// release builds truncate to what is buffered. Returns the number of
    /// bytes copied.
    pub fn read(&mut self, output: &mut [u8]) -> usize {
        debug_assert!(
            output.len() <= self.fill_count(),
            "read of {} bytes exceeds fill count {}",
            output.len(),
            self.fill_count()
        );
        let length = output.len().min(self.fill_count());

        let offset = self.read_offset();
        let tail = self.capacity() - offset;

        if length <= tail {
            // Contiguous read
            output[..length].copy_from_slice(&self.buffer[offset..offset + length]);
        } else {
            // Wrap-around read
            output[..tail].copy_from_slice(&self.buffer[offset..]);
            output[tail..length].copy_from_slice(&self.buffer[..length - tail]);
        }

        self.read_count += length as u64;
        length
    }

    /// Record bytes lost upstream of the buffer as an overflow, e.g. a
    /// zero-fill request that did not fit.
    pub fn record_overflow(&mut self, dropped: usize) {
        self.overflow_count += 1;
        self.dropped_bytes += dropped as u64;
    }

    /// Clear the buffer.
    ///
    /// Only the counters are reset; stale bytes in storage are unreachable.
    pub fn clear(&mut self) {
        self.read_count = 0;
        self.write_count = 0;
        self.overflow_count = 0;
        self.dropped_bytes = 0;
    }
}
