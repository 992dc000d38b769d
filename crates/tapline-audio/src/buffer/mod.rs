//! Capture buffers shared between the backend callback and the consumer.

pub mod ring;
pub mod window;

pub use ring::RingBuffer;
pub use window::{FrameWindowExtractor, TickReport};
