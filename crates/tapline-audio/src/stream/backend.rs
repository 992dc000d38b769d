//! Seam between the capture core and a platform audio backend.

use tapline_core::{Result, StreamFormat};

use super::StreamHandler;

/// An audio input backend able to run one capture stream.
///
/// Device selection and format negotiation happen behind this trait; the
/// capture core only sees the negotiated [`StreamFormat`] and the callbacks
/// routed through [`StreamHandler`].
pub trait CaptureBackend: Send {
    /// Negotiate the stream, requesting at least `requested_latency` seconds
    /// of software latency, and report the format actually granted.
    ///
    /// Samples must be interleaved 32-bit floats.
    fn open(&mut self, requested_latency: f64) -> Result<StreamFormat>;

    /// Begin invoking `handler` from the backend's callback thread.
    fn start(&mut self, handler: StreamHandler) -> Result<()>;

    /// Stop the stream.
    ///
    /// Must not return while a callback may still run, and must drop the
    /// handler so the capture buffers can be released.
    fn stop(&mut self);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "audio backend"
    }
}
