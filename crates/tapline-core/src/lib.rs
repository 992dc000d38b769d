//! # tapline-core
//!
//! Core types, configuration, and error handling for the Tapline audio
//! capture layer.

pub mod error;
pub mod types;

pub use error::{Error, Result, StreamError};
pub use types::*;
