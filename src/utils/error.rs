//! Error types and handling
//!
//! Failures that abort a recording session before the first fragment.
//! Errors raised while fragments are streaming never surface here; the
//! fragment stream logs them and ends.

use thiserror::Error;

/// Session setup error type
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Media source unavailable: {0}")]
    SourceAcquisition(String),

    #[error("Invalid source url {url}: {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RecordingError {
    /// Whether the error happened while acquiring the socket or process
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            RecordingError::InvalidSourceUrl { .. }
                | RecordingError::Connect { .. }
                | RecordingError::Spawn { .. }
        )
    }
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_failures_are_flagged() {
        let err = RecordingError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(err.is_resource_failure());
        assert!(!RecordingError::SourceAcquisition("gone".into()).is_resource_failure());
    }
}
