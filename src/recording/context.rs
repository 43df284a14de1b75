//! Session collaborators
//!
//! The capabilities a recording request needs from the host: media source
//! lookup, stored preferences, argument template evaluation and user alerts.
//! They are passed in explicitly through [`RecordingContext`].

use super::types::{MediaSourceDescriptor, MediaSourceRequest, MediaStreamOption, TranscodeRequest};
use crate::utils::config::TranscoderConfig;
use crate::utils::error::{RecordingError, RecordingResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Preference keys read by the request handler
pub mod keys {
    pub const RECORDING_CHANNEL: &str = "recordingChannel";
    pub const TRANSCODE_RECORDING: &str = "transcodeRecording";
    pub const VIDEO_DECODER_ARGUMENTS: &str = "videoDecoderArguments";
    pub const H264_ENCODER_ARGUMENTS: &str = "h264EncoderArguments";
}

/// Resolves the camera's streams into ffmpeg-readable sources
#[async_trait]
pub trait MediaSourceProvider: Send + Sync {
    /// Streams the camera offers
    async fn stream_options(&self) -> RecordingResult<Vec<MediaStreamOption>>;

    /// Resolve a stream into a source description
    async fn media_source(&self, request: &MediaSourceRequest)
        -> RecordingResult<MediaSourceDescriptor>;
}

/// Read-only key/value preferences for the camera
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Turns an operator argument template into ffmpeg tokens
pub trait TemplateEvaluator: Send + Sync {
    fn evaluate(&self, template: &str, request: &TranscodeRequest) -> RecordingResult<Vec<String>>;
}

/// User-facing notifications
pub trait AlertSink: Send + Sync {
    fn alert(&self, message: &str);
}

/// Everything a recording request depends on
#[derive(Clone)]
pub struct RecordingContext {
    /// Camera name, used in logs and alerts
    pub device_name: String,
    pub sources: Arc<dyn MediaSourceProvider>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub templates: Arc<dyn TemplateEvaluator>,
    pub alerts: Arc<dyn AlertSink>,
    pub transcoder: TranscoderConfig,
}

impl RecordingContext {
    /// Context with placeholder templates and log alerts
    pub fn new(
        device_name: impl Into<String>,
        sources: Arc<dyn MediaSourceProvider>,
        preferences: Arc<dyn PreferenceStore>,
        transcoder: TranscoderConfig,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            sources,
            preferences,
            templates: Arc::new(PlaceholderTemplate),
            alerts: Arc::new(LogAlerts),
            transcoder,
        }
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateEvaluator>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Non-empty preference value
    pub fn preference(&self, key: &str) -> Option<String> {
        self.preferences.get(key).filter(|value| !value.is_empty())
    }

    pub fn force_transcode(&self) -> bool {
        self.preferences.get(keys::TRANSCODE_RECORDING).as_deref() == Some("true")
    }
}

/// Serves one fixed source regardless of the requested stream
pub struct StaticMediaSource {
    descriptor: MediaSourceDescriptor,
    streams: Vec<MediaStreamOption>,
}

impl StaticMediaSource {
    pub fn new(descriptor: MediaSourceDescriptor) -> Self {
        Self {
            descriptor,
            streams: Vec::new(),
        }
    }

    pub fn with_streams(mut self, streams: Vec<MediaStreamOption>) -> Self {
        self.streams = streams;
        self
    }
}

#[async_trait]
impl MediaSourceProvider for StaticMediaSource {
    async fn stream_options(&self) -> RecordingResult<Vec<MediaStreamOption>> {
        Ok(self.streams.clone())
    }

    async fn media_source(
        &self,
        request: &MediaSourceRequest,
    ) -> RecordingResult<MediaSourceDescriptor> {
        if request.container != "mp4" {
            return Err(RecordingError::SourceAcquisition(format!(
                "unsupported container {}",
                request.container
            )));
        }
        if let Some(id) = &request.id {
            if !self.streams.is_empty() && !self.streams.iter().any(|s| &s.id == id) {
                return Err(RecordingError::SourceAcquisition(format!(
                    "no stream with id {}",
                    id
                )));
            }
        }
        Ok(self.descriptor.clone())
    }
}

/// In-memory preferences
#[derive(Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }
}

impl From<HashMap<String, String>> for MemoryPreferences {
    fn from(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

/// Substitutes `${path}` placeholders from the serialized request, then
/// splits on whitespace
///
/// `${video.width}` resolves to `request.video.width`; the `request.` prefix
/// is optional.
pub struct PlaceholderTemplate;

impl TemplateEvaluator for PlaceholderTemplate {
    fn evaluate(&self, template: &str, request: &TranscodeRequest) -> RecordingResult<Vec<String>> {
        let context = serde_json::to_value(request)?;
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                RecordingError::Template(format!("unterminated placeholder in {:?}", template))
            })?;
            let path = after[..end].trim();
            let path = path.strip_prefix("request.").unwrap_or(path);

            let value = path
                .split('.')
                .try_fold(&context, |value, key| value.get(key))
                .ok_or_else(|| RecordingError::Template(format!("unknown placeholder {}", path)))?;
            match value {
                serde_json::Value::String(s) => rendered.push_str(s),
                other => rendered.push_str(&other.to_string()),
            }
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered.split_whitespace().map(String::from).collect())
    }
}

/// Alerts written to the log
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::types::{H264Level, H264Profile, TranscodeVideoRequest};

    fn request() -> TranscodeRequest {
        TranscodeRequest {
            video: TranscodeVideoRequest {
                width: 1280,
                height: 720,
                fps: 24,
                max_bit_rate: 800,
                profile: H264Profile::Main,
                level: H264Level::Level3_1,
            },
        }
    }

    #[test]
    fn test_placeholder_substitution() {
        let tokens = PlaceholderTemplate
            .evaluate(
                "-c:v h264_vaapi -b:v ${video.maxBitRate}k -s ${request.video.width}x${video.height}",
                &request(),
            )
            .unwrap();
        assert_eq!(
            tokens,
            vec!["-c:v", "h264_vaapi", "-b:v", "800k", "-s", "1280x720"]
        );
    }

    #[test]
    fn test_placeholder_string_values_are_unquoted() {
        let tokens = PlaceholderTemplate
            .evaluate("-profile:v ${video.profile} -level ${video.level}", &request())
            .unwrap();
        assert_eq!(tokens, vec!["-profile:v", "main", "-level", "3.1"]);
    }

    #[test]
    fn test_placeholder_errors() {
        assert!(matches!(
            PlaceholderTemplate.evaluate("${video.width", &request()),
            Err(RecordingError::Template(_))
        ));
        assert!(matches!(
            PlaceholderTemplate.evaluate("${video.depth}", &request()),
            Err(RecordingError::Template(_))
        ));
    }

    #[test]
    fn test_memory_preferences() {
        let preferences = MemoryPreferences::new();
        assert_eq!(preferences.get(keys::TRANSCODE_RECORDING), None);
        preferences.set(keys::TRANSCODE_RECORDING, "true");
        assert_eq!(
            preferences.get(keys::TRANSCODE_RECORDING).as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_static_source_rejects_unknown_stream() {
        let descriptor: MediaSourceDescriptor =
            serde_json::from_str(r#"{ "url": "tcp://cam:1" }"#).unwrap();
        let source = StaticMediaSource::new(descriptor).with_streams(vec![MediaStreamOption {
            id: "main".to_string(),
            name: "Main".to_string(),
        }]);

        let request = MediaSourceRequest {
            id: Some("sub".to_string()),
            prebuffer: 0,
            container: "mp4".to_string(),
        };
        assert!(matches!(
            source.media_source(&request).await,
            Err(RecordingError::SourceAcquisition(_))
        ));
    }
}
