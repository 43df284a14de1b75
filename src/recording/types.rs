//! Recording types
//!
//! Recording parameters negotiated with the consumer, the media source
//! description produced by source discovery, and the template context handed
//! to operator-supplied argument templates.

use serde::{Deserialize, Deserializer, Serialize};

/// H.264 profile requested for re-encoded video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum H264Profile {
    Baseline,
    #[default]
    Main,
    High,
}

impl H264Profile {
    /// Value for ffmpeg's `-profile:v`
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            H264Profile::Baseline => "baseline",
            H264Profile::Main => "main",
            H264Profile::High => "high",
        }
    }
}

/// H.264 level requested for re-encoded video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum H264Level {
    #[serde(rename = "3.1")]
    Level3_1,
    #[serde(rename = "3.2")]
    Level3_2,
    #[serde(rename = "4.0")]
    #[default]
    Level4_0,
}

impl H264Level {
    /// Value for ffmpeg's `-level:v`
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            H264Level::Level3_1 => "3.1",
            H264Level::Level3_2 => "3.2",
            H264Level::Level4_0 => "4.0",
        }
    }
}

/// Video stream parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCodecParameters {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in kbps
    pub bitrate: u32,
    #[serde(default)]
    pub profile: H264Profile,
    #[serde(default)]
    pub level: H264Level,
}

/// AAC flavour requested by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodecType {
    #[serde(rename = "AAC-LC")]
    AacLc,
    #[serde(rename = "AAC-ELD")]
    AacEld,
}

impl AudioCodecType {
    /// Value for ffmpeg's `-profile:a`
    pub fn ffmpeg_profile(&self) -> &'static str {
        match self {
            AudioCodecType::AacLc => "aac_low",
            AudioCodecType::AacEld => "aac_eld",
        }
    }
}

/// Audio sample-rate class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioSampleRate {
    #[serde(rename = "8")]
    Khz8,
    #[serde(rename = "16")]
    Khz16,
    #[serde(rename = "24")]
    Khz24,
    #[serde(rename = "32")]
    Khz32,
    #[serde(rename = "44.1")]
    Khz44_1,
    #[serde(rename = "48")]
    Khz48,
}

impl AudioSampleRate {
    /// Rate in kHz as written in ffmpeg's `-ar` (suffixed with `k`)
    pub fn khz(&self) -> &'static str {
        match self {
            AudioSampleRate::Khz8 => "8",
            AudioSampleRate::Khz16 => "16",
            AudioSampleRate::Khz24 => "24",
            AudioSampleRate::Khz32 => "32",
            AudioSampleRate::Khz44_1 => "44.1",
            AudioSampleRate::Khz48 => "48",
        }
    }
}

/// Audio stream parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCodecParameters {
    #[serde(rename = "type")]
    pub codec_type: AudioCodecType,
    pub samplerate: AudioSampleRate,
    /// Target bitrate in kbps
    pub bitrate: u32,
    pub audio_channels: u8,
}

/// Container parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContainerConfiguration {
    /// Requested prebuffer in milliseconds
    pub prebuffer_length: u64,
}

/// Parameters for one recording, fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfiguration {
    pub video_codec: VideoCodecParameters,
    pub audio_codec: AudioCodecParameters,
    pub media_container_configuration: MediaContainerConfiguration,
}

/// A stream offered by the camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamOption {
    pub id: String,
    pub name: String,
}

/// Audio track of a media source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamOptions {
    pub codec: Option<String>,
}

/// What the source reports about its audio track
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AudioPresence {
    /// Not reported
    #[default]
    Unknown,
    /// Reported as having no audio track
    Absent,
    Present(AudioStreamOptions),
}

impl AudioPresence {
    pub fn codec(&self) -> Option<&str> {
        match self {
            AudioPresence::Present(audio) => audio.codec.as_deref(),
            _ => None,
        }
    }
}

// `audio: null` and a missing `audio` key mean different things
fn deserialize_audio_presence<'de, D>(deserializer: D) -> Result<AudioPresence, D::Error>
where
    D: Deserializer<'de>,
{
    let audio: Option<AudioStreamOptions> = Option::deserialize(deserializer)?;
    Ok(match audio {
        Some(audio) => AudioPresence::Present(audio),
        None => AudioPresence::Absent,
    })
}

fn serialize_audio_presence<S>(audio: &AudioPresence, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match audio {
        AudioPresence::Present(audio) => serializer.serialize_some(audio),
        _ => serializer.serialize_none(),
    }
}

/// Stream metadata attached to a media source
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStreamOptions {
    pub id: Option<String>,
    /// Prebuffer held upstream, in milliseconds
    pub prebuffer: Option<u64>,
    #[serde(
        default,
        deserialize_with = "deserialize_audio_presence",
        serialize_with = "serialize_audio_presence",
        skip_serializing_if = "is_unknown_audio"
    )]
    pub audio: AudioPresence,
}

fn is_unknown_audio(audio: &AudioPresence) -> bool {
    *audio == AudioPresence::Unknown
}

/// Description of a resolved media source, in ffmpeg input form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSourceDescriptor {
    /// Transport url, the scheme selects the transport (`tcp://`, `rtsp://`...)
    pub url: String,
    pub container: Option<String>,
    /// Arguments that make ffmpeg read this source
    #[serde(default)]
    pub input_arguments: Vec<String>,
    pub media_stream_options: Option<SourceStreamOptions>,
}

impl MediaSourceDescriptor {
    /// Scheme of the transport url as written, empty when there is none
    pub fn transport_scheme(&self) -> String {
        self.url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_string())
            .unwrap_or_default()
    }

    pub fn audio(&self) -> AudioPresence {
        self.media_stream_options
            .as_ref()
            .map(|options| options.audio.clone())
            .unwrap_or_default()
    }

    pub fn is_prebuffered(&self) -> bool {
        self.media_stream_options
            .as_ref()
            .and_then(|options| options.prebuffer)
            .map(|ms| ms > 0)
            .unwrap_or(false)
    }
}

/// Parameters for the media source lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSourceRequest {
    /// Stream to use, None for the camera's default
    pub id: Option<String>,
    /// Requested prebuffer in milliseconds
    pub prebuffer: u64,
    pub container: String,
}

/// Video section of the template context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeVideoRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub max_bit_rate: u32,
    pub profile: H264Profile,
    pub level: H264Level,
}

/// Context given to operator argument templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub video: TranscodeVideoRequest,
}

impl From<&RecordingConfiguration> for TranscodeRequest {
    fn from(configuration: &RecordingConfiguration) -> Self {
        let video = &configuration.video_codec;
        Self {
            video: TranscodeVideoRequest {
                width: video.width,
                height: video.height,
                fps: video.fps,
                max_bit_rate: video.bitrate,
                profile: video.profile,
                level: video.level,
            },
        }
    }
}
