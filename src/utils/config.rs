//! Transcoder configuration
//!
//! Process-wide settings for the transcode path. Loaded once from JSON and
//! shared by every session.

use crate::utils::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the ffmpeg binary path
pub const FFMPEG_PATH_ENV: &str = "HKSV_FFMPEG_PATH";

/// Interval between forced keyframes, bounds the fragment duration
pub const DEFAULT_KEYFRAME_INTERVAL_SECS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscoderConfig {
    /// ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Seconds between forced keyframes when re-encoding video
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval_secs: u32,

    /// AAC encoder used when audio has to be transcoded
    #[serde(default = "default_audio_encoder")]
    pub audio_encoder: String,

    /// Largest box the parser accepts before treating the stream as corrupt
    #[serde(default = "default_max_box_size")]
    pub max_box_size: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_keyframe_interval() -> u32 {
    DEFAULT_KEYFRAME_INTERVAL_SECS
}

fn default_audio_encoder() -> String {
    "libfdk_aac".to_string()
}

fn default_max_box_size() -> u64 {
    256 * 1024 * 1024
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            keyframe_interval_secs: default_keyframe_interval(),
            audio_encoder: default_audio_encoder(),
            max_box_size: default_max_box_size(),
        }
    }
}

impl TranscoderConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn load(path: &Path) -> RecordingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.with_env_overrides().validated()
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> RecordingResult<Self> {
        Self::default().with_env_overrides().validated()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(FFMPEG_PATH_ENV) {
            if !path.trim().is_empty() {
                tracing::debug!("Using ffmpeg from {}: {}", FFMPEG_PATH_ENV, path);
                self.ffmpeg_path = PathBuf::from(path);
            }
        }
        self
    }

    fn validated(self) -> RecordingResult<Self> {
        if self.keyframe_interval_secs == 0 {
            return Err(RecordingError::Config(
                "keyframeIntervalSecs must be at least 1".to_string(),
            ));
        }
        if self.audio_encoder.trim().is_empty() {
            return Err(RecordingError::Config("audioEncoder is empty".to_string()));
        }
        if self.max_box_size < 16 {
            return Err(RecordingError::Config(
                "maxBoxSize is smaller than a box header".to_string(),
            ));
        }
        Ok(self)
    }
}
