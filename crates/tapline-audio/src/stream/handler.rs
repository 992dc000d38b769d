//! Producer side of an input stream, driven by the backend callback thread.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tapline_core::{StreamError, StreamFormat, BYTES_PER_SAMPLE};
use tracing::warn;

use crate::buffer::RingBuffer;
use crate::interleave::{copy_interleaved, packed_span, ChannelArea};

/// Notifications raised on the callback thread and handled on the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The backend dropped input before it reached the ring buffer.
    Overflow,
    /// The backend failed; the stream is unusable.
    Error(StreamError),
}

/// State shared by the producer handler and the owning stream.
#[derive(Debug)]
pub(crate) struct StreamShared {
    /// Capture ring; every access goes through this lock.
    pub(crate) ring: Mutex<RingBuffer>,
    /// Cleared by the owner before the backend is stopped.
    pub(crate) running: AtomicBool,
    /// Set once by the first backend error.
    pub(crate) failed: AtomicBool,
    /// The error that invalidated the stream.
    pub(crate) fault: Mutex<Option<StreamError>>,
}

impl StreamShared {
    pub(crate) fn new(ring: RingBuffer) -> Self {
        Self {
            ring: Mutex::new(ring),
            running: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn fault(&self) -> Option<StreamError> {
        *self.fault.lock()
    }
}

/// Callback sink handed to a [`CaptureBackend`](super::CaptureBackend) when
/// the stream starts.
///
/// Every method is bounded in time and none of them allocates: strided input
/// is gathered into a scratch buffer sized at open time.
pub struct StreamHandler {
    shared: Arc<StreamShared>,
    events: Sender<StreamEvent>,
    channel_count: usize,
    bytes_per_frame: usize,
    /// Gather space for non-interleaved areas.
    scratch: Box<[u8]>,
}

impl StreamHandler {
    pub(crate) fn new(
        shared: Arc<StreamShared>,
        events: Sender<StreamEvent>,
        format: &StreamFormat,
        scratch_size: usize,
    ) -> Self {
        let bytes_per_frame = format.bytes_per_frame();
        let scratch_size = (scratch_size / bytes_per_frame).max(1) * bytes_per_frame;

        Self {
            shared,
            events,
            channel_count: usize::from(format.channel_count),
            bytes_per_frame,
            scratch: vec![0u8; scratch_size].into_boxed_slice(),
        }
    }

    /// Whether the owning stream still accepts data.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire) && !self.shared.is_failed()
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Deliver `frame_count` captured frames.
    ///
    /// `None` means the backend has no data for this region (e.g. a hardware
    /// underrun); it is recorded as silence so the byte ledger stays in step
    /// with the device clock.
    pub fn on_read(&mut self, frame_count: usize, areas: Option<&[ChannelArea<'_>]>) {
        if frame_count == 0 || !self.is_running() {
            return;
        }

        let Some(areas) = areas else {
            self.write_silence(frame_count * self.bytes_per_frame);
            return;
        };

        if areas.len() != self.channel_count {
            self.on_error(StreamError::Layout);
            return;
        }

        match packed_span(areas, BYTES_PER_SAMPLE, frame_count) {
            Ok(Some(span)) => {
                self.shared.ring.lock().write(span);
            }
            Ok(None) => self.gather(areas, frame_count),
            Err(_) => self.on_error(StreamError::Layout),
        }
    }

    /// The backend reported that it lost input on its side.
    pub fn on_overflow(&self) {
        self.notify(StreamEvent::Overflow);
    }

    /// The backend reported a fatal stream error.
    pub fn on_error(&self, error: StreamError) {
        if self.shared.failed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.shared.fault.lock() = Some(error);
        self.notify(StreamEvent::Error(error));
    }

    fn write_silence(&self, length: usize) {
        let mut ring = self.shared.ring.lock();
        let fit = length.min(ring.free_count());
        ring.write_empty(fit);
        if fit < length {
            ring.record_overflow(length - fit);
        }
    }

    /// Interleave strided areas into the ring through the scratch buffer.
    ///
    /// Frames that cannot fit are dropped from the front of the delivery, so
    /// an overflow keeps the newest audio just like a packed write does.
    fn gather(&mut self, areas: &[ChannelArea<'_>], frame_count: usize) {
        let chunk_frames = self.scratch.len() / self.bytes_per_frame;
        let mut chunk = [ChannelArea::new(&[], 0); MAX_CHANNELS];
        let Some(chunk) = chunk.get_mut(..areas.len()) else {
            self.on_error(StreamError::Layout);
            return;
        };

        let mut ring = self.shared.ring.lock();
        let free_frames = ring.free_count() / self.bytes_per_frame;
        let skip = frame_count.saturating_sub(free_frames);
        if skip > 0 {
            let dropped = skip * self.bytes_per_frame;
            ring.record_overflow(dropped);
            warn!(
                "Ring buffer overflow: dropped {} of {} bytes",
                dropped,
                frame_count * self.bytes_per_frame
            );
        }

        let mut done = skip;
        while done < frame_count {
            let frames = chunk_frames.min(frame_count - done);

            for (dst, src) in chunk.iter_mut().zip(areas) {
                let start = done * src.step;
                *dst = ChannelArea::new(src.data.get(start..).unwrap_or(&[]), src.step);
            }

            match copy_interleaved(chunk, BYTES_PER_SAMPLE, frames, &mut self.scratch) {
                Ok(len) => {
                    ring.write(&self.scratch[..len]);
                }
                Err(_) => {
                    drop(ring);
                    self.on_error(StreamError::Layout);
                    return;
                }
            }

            done += frames;
        }
    }

    fn notify(&self, event: StreamEvent) {
        // A full queue only loses the notification; fault state is already
        // recorded in the shared flags.
        if let Err(TrySendError::Disconnected(_)) = self.events.try_send(event) {
            self.shared.running.store(false, Ordering::Release);
        }
    }
}

/// Most channels a stream may carry; the gather path reslices areas on the
/// stack.
pub const MAX_CHANNELS: usize = 64;

/// Consumer end of the event queue.
pub(crate) type EventReceiver = Receiver<StreamEvent>;
