//! Passthrough compatibility
//!
//! A prebuffered source can be forwarded as-is only when it is already
//! fragmented MP4 over raw TCP with an AAC audio track.

use super::types::{AudioPresence, MediaSourceDescriptor};
use serde::{Deserialize, Serialize};

/// How a session obtains its bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamDecision {
    /// Read the prebuffer socket directly
    Passthrough,
    /// Pipe the source through ffmpeg
    Transcode,
}

/// Decide whether a source can be forwarded unmodified
pub fn is_passthrough_compatible(
    container: &str,
    transport_scheme: &str,
    audio_present: bool,
    audio_codec: Option<&str>,
    force_transcode: bool,
) -> bool {
    container == "mp4"
        && transport_scheme == "tcp"
        && audio_present
        && audio_codec
            .map(|codec| codec.to_lowercase().contains("aac"))
            .unwrap_or(false)
        && !force_transcode
}

/// Facts about a source that drive both the decision and the arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTraits {
    /// The source explicitly reports no audio track
    pub no_audio: bool,
    /// The audio codec is unknown or is not AAC
    pub not_aac: bool,
    /// The operator asked for every recording to be transcoded
    pub force_transcode: bool,
    pub audio_codec: Option<String>,
    container: Option<String>,
    transport_scheme: String,
}

impl SourceTraits {
    pub fn inspect(source: &MediaSourceDescriptor, force_transcode: bool) -> Self {
        let audio = source.audio();
        let audio_codec = audio.codec().map(str::to_string);
        let not_aac = audio_codec
            .as_deref()
            .map(|codec| !codec.to_lowercase().contains("aac"))
            .unwrap_or(true);

        Self {
            no_audio: audio == AudioPresence::Absent,
            not_aac,
            force_transcode,
            audio_codec,
            container: source.container.clone(),
            transport_scheme: source.transport_scheme(),
        }
    }

    /// The audio track must be re-encoded (or synthesized)
    pub fn incompatible(&self) -> bool {
        self.no_audio || self.force_transcode || self.not_aac
    }

    pub fn evaluate(&self) -> StreamDecision {
        let compatible = is_passthrough_compatible(
            self.container.as_deref().unwrap_or_default(),
            &self.transport_scheme,
            !self.no_audio,
            self.audio_codec.as_deref(),
            self.force_transcode,
        );
        if compatible {
            StreamDecision::Passthrough
        } else {
            StreamDecision::Transcode
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_decision_matches_predicate(
        #[values(true, false)] mp4: bool,
        #[values(true, false)] tcp: bool,
        #[values(true, false)] audio_present: bool,
        #[values(true, false)] aac: bool,
        #[values(true, false)] force: bool,
    ) {
        let container = if mp4 { "mp4" } else { "mpegts" };
        let scheme = if tcp { "tcp" } else { "rtsp" };
        let codec = if aac { "AAC" } else { "pcm_mulaw" };

        let compatible =
            is_passthrough_compatible(container, scheme, audio_present, Some(codec), force);

        assert_eq!(compatible, mp4 && tcp && audio_present && aac && !force);
    }

    #[rstest]
    #[case("aac", true)]
    #[case("AAC", true)]
    #[case("mp4a.40.2 (aac)", true)]
    #[case("opus", false)]
    #[case("", false)]
    fn test_codec_match_is_case_insensitive(#[case] codec: &str, #[case] expected: bool) {
        assert_eq!(
            is_passthrough_compatible("mp4", "tcp", true, Some(codec), false),
            expected
        );
    }

    #[test]
    fn test_missing_codec_is_not_compatible() {
        assert!(!is_passthrough_compatible("mp4", "tcp", true, None, false));
    }

    fn source(json: &str) -> MediaSourceDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_inspect_passthrough_source() {
        let traits = SourceTraits::inspect(
            &source(
                r#"{ "url": "tcp://host:1234", "container": "mp4",
                     "mediaStreamOptions": { "audio": { "codec": "aac" } } }"#,
            ),
            false,
        );
        assert!(!traits.incompatible());
        assert_eq!(traits.evaluate(), StreamDecision::Passthrough);
    }

    #[test]
    fn test_inspect_forced_transcode() {
        let traits = SourceTraits::inspect(
            &source(
                r#"{ "url": "tcp://host:1234", "container": "mp4",
                     "mediaStreamOptions": { "audio": { "codec": "aac" } } }"#,
            ),
            true,
        );
        assert!(traits.incompatible());
        assert_eq!(traits.evaluate(), StreamDecision::Transcode);
    }

    #[test]
    fn test_inspect_no_audio() {
        let traits = SourceTraits::inspect(
            &source(
                r#"{ "url": "tcp://host:1234", "container": "mp4",
                     "mediaStreamOptions": { "audio": null } }"#,
            ),
            false,
        );
        assert!(traits.no_audio);
        assert!(traits.not_aac);
        assert_eq!(traits.evaluate(), StreamDecision::Transcode);
    }

    #[test]
    fn test_inspect_unknown_audio_is_not_aac() {
        let traits =
            SourceTraits::inspect(&source(r#"{ "url": "tcp://host:1234", "container": "mp4" }"#), false);
        assert!(!traits.no_audio);
        assert!(traits.not_aac);
        assert_eq!(traits.evaluate(), StreamDecision::Transcode);
    }

    #[test]
    fn test_inspect_uppercase_tcp_scheme_transcodes() {
        let traits = SourceTraits::inspect(
            &source(
                r#"{ "url": "TCP://host:1234", "container": "mp4",
                     "mediaStreamOptions": { "audio": { "codec": "aac" } } }"#,
            ),
            false,
        );
        assert_eq!(traits.evaluate(), StreamDecision::Transcode);
    }

    #[test]
    fn test_inspect_rtsp_transport() {
        let traits = SourceTraits::inspect(
            &source(
                r#"{ "url": "rtsp://host/live", "container": "mp4",
                     "mediaStreamOptions": { "audio": { "codec": "aac" } } }"#,
            ),
            false,
        );
        assert!(!traits.incompatible());
        assert_eq!(traits.evaluate(), StreamDecision::Transcode);
    }
}
