//! Shared utilities

pub mod config;
pub mod error;

pub use config::TranscoderConfig;
pub use error::{RecordingError, RecordingResult};
