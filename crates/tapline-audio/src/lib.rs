//! # tapline-audio
//!
//! Audio input capture for Tapline.
//!
//! Features:
//! - Byte ring buffer bridging the backend callback thread and the consumer
//! - Per-tick "last frame window" sized from elapsed time
//! - Input streams and a driver over a pluggable capture backend
//! - Synthetic tone backend for demos and tests
//! - Level meter, spectrum analyzer, and LTC decoder over the frame window

pub mod backend;
pub mod buffer;
pub mod driver;
pub mod dsp;
pub mod interleave;
pub mod stream;

pub use backend::{ToneBackend, ToneSettings};
pub use buffer::{FrameWindowExtractor, RingBuffer, TickReport};
pub use driver::{Driver, PrunedStream, StreamId};
pub use stream::{CaptureBackend, InputStream, StreamEvent, StreamHandler};
