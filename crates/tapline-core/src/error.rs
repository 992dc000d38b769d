//! Error types for Tapline.

use thiserror::Error;

/// Result type alias using Tapline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tapline.
#[derive(Error, Debug)]
pub enum Error {
    // Stream lifecycle errors
    #[error("Failed to open input stream: {0}")]
    StreamOpen(String),

    #[error("Input stream is no longer valid: {0}")]
    StreamInvalid(StreamError),

    #[error("Unknown stream handle: {0}")]
    UnknownStream(u32),

    // Backend errors
    #[error("Audio backend error: {0}")]
    Backend(String),

    #[error("Malformed channel areas: {0}")]
    ChannelArea(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error leaves the stream unusable until it is
    /// reopened by the caller.
    pub const fn is_stream_fatal(&self) -> bool {
        matches!(
            self,
            Self::StreamOpen(_) | Self::StreamInvalid(_) | Self::Backend(_)
        )
    }
}

/// Fault reported by an audio backend from its callback thread.
///
/// `Copy` so the realtime thread can hand it over without allocating.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("device disconnected")]
    Disconnected,

    #[error("stream underflow could not be recovered")]
    Underflow,

    #[error("backend stream fault (code {0})")]
    Streaming(i32),

    #[error("system resources exhausted")]
    SystemResources,

    #[error("channel areas do not match the stream layout")]
    Layout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_stream_fatal() {
        assert!(Error::StreamInvalid(StreamError::Disconnected).is_stream_fatal());
        assert!(Error::Backend("gone".into()).is_stream_fatal());
        assert!(!Error::InvalidArgument("test".into()).is_stream_fatal());
        assert!(!Error::Config("bad".into()).is_stream_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::StreamInvalid(StreamError::Streaming(-3));
        assert_eq!(
            err.to_string(),
            "Input stream is no longer valid: backend stream fault (code -3)"
        );
    }
}
