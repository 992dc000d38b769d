//! Core domain types for Tapline.

pub mod config;
pub mod format;

pub use config::{CaptureConfig, MAX_BUFFERED_SECS};
pub use format::{StreamFormat, BYTES_PER_SAMPLE};
