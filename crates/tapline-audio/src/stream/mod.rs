//! Input streams and the backend callback contract.
//!
//! ```text
//! backend thread ── StreamHandler::on_read ──► RingBuffer (Mutex)
//!                                                  │ once per tick
//! consumer ── InputStream::update ── FrameWindowExtractor ──► last frame window
//! ```

mod backend;
mod handler;
mod input;

pub use backend::CaptureBackend;
pub use handler::{StreamEvent, StreamHandler, MAX_CHANNELS};
pub use input::InputStream;
