//! ffmpeg argument construction for the transcode path
//!
//! Builds the input, audio and video argument groups from the recording
//! configuration. The groups are passed to ffmpeg in that order, followed by
//! the fragmented MP4 output arguments.

use super::compat::SourceTraits;
use super::context::TemplateEvaluator;
use super::types::{MediaSourceDescriptor, RecordingConfiguration, TranscodeRequest};
use crate::utils::config::TranscoderConfig;
use crate::utils::error::RecordingResult;

/// Silent mono input, only used when the source has no audio
const SILENT_AUDIO_INPUT: [&str; 5] = ["-f", "lavfi", "-i", "anullsrc=cl=1", "-shortest"];

/// Converts ADTS framed AAC into what the MP4 muxer expects
const AAC_BITSTREAM_FILTER: [&str; 2] = ["-bsf:a", "aac_adtstoasc"];

/// Fragmented MP4 on stdout
const OUTPUT_ARGUMENTS: [&str; 5] = [
    "-f",
    "mp4",
    "-movflags",
    "frag_keyframe+empty_moov+default_base_moof",
    "pipe:1",
];

/// Operator-supplied templates that replace default argument sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentOverrides {
    pub video_decoder: Option<String>,
    pub h264_encoder: Option<String>,
}

/// Argument groups handed to the transcoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeArguments {
    pub input: Vec<String>,
    pub audio: Vec<String>,
    pub video: Vec<String>,
}

impl TranscodeArguments {
    /// Full ffmpeg command line: input, audio, video, then output
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(
            1 + self.input.len() + self.audio.len() + self.video.len() + OUTPUT_ARGUMENTS.len(),
        );
        args.push("-hide_banner".to_string());
        args.extend(self.input.iter().cloned());
        args.extend(self.audio.iter().cloned());
        args.extend(self.video.iter().cloned());
        args.extend(OUTPUT_ARGUMENTS.iter().map(|s| s.to_string()));
        args
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Builds [`TranscodeArguments`] for one recording
pub struct ArgumentBuilder<'a> {
    configuration: &'a RecordingConfiguration,
    traits: &'a SourceTraits,
    transcoder: &'a TranscoderConfig,
    overrides: ArgumentOverrides,
}

impl<'a> ArgumentBuilder<'a> {
    pub fn new(
        configuration: &'a RecordingConfiguration,
        traits: &'a SourceTraits,
        transcoder: &'a TranscoderConfig,
    ) -> Self {
        Self {
            configuration,
            traits,
            transcoder,
            overrides: ArgumentOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: ArgumentOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn build(
        &self,
        source: &MediaSourceDescriptor,
        templates: &dyn TemplateEvaluator,
    ) -> RecordingResult<TranscodeArguments> {
        let request = TranscodeRequest::from(self.configuration);
        Ok(TranscodeArguments {
            input: self.input_args(source, templates, &request)?,
            audio: self.audio_args(),
            video: self.video_args(templates, &request)?,
        })
    }

    fn input_args(
        &self,
        source: &MediaSourceDescriptor,
        templates: &dyn TemplateEvaluator,
        request: &TranscodeRequest,
    ) -> RecordingResult<Vec<String>> {
        let mut args = Vec::new();

        // Decoder arguments only apply when the video is re-encoded
        if self.traits.force_transcode {
            if let Some(template) = &self.overrides.video_decoder {
                args.extend(templates.evaluate(template, request)?);
            }
        }

        args.extend(source.input_arguments.iter().cloned());

        if self.traits.no_audio {
            tracing::info!("Source has no audio, adding a silent audio track");
            args.extend(owned(&SILENT_AUDIO_INPUT));
        }

        Ok(args)
    }

    fn audio_args(&self) -> Vec<String> {
        let mut args = owned(&AAC_BITSTREAM_FILTER);

        if !self.traits.incompatible() {
            args.extend(owned(&["-acodec", "copy"]));
            return args;
        }

        if !(self.traits.no_audio || self.traits.force_transcode) {
            tracing::warn!(
                "Recording audio is not explicitly AAC ({:?}), forcing transcoding. Setting audio output to AAC is recommended.",
                self.traits.audio_codec
            );
        }

        let audio = &self.configuration.audio_codec;
        args.extend([
            "-acodec".to_string(),
            self.transcoder.audio_encoder.clone(),
            "-profile:a".to_string(),
            audio.codec_type.ffmpeg_profile().to_string(),
            "-ar".to_string(),
            format!("{}k", audio.samplerate.khz()),
            "-b:a".to_string(),
            format!("{}k", audio.bitrate),
            "-ac".to_string(),
            audio.audio_channels.to_string(),
        ]);
        args
    }

    fn video_args(
        &self,
        templates: &dyn TemplateEvaluator,
        request: &TranscodeRequest,
    ) -> RecordingResult<Vec<String>> {
        // The source video is H.264 already unless the operator forces a re-encode
        if !self.traits.force_transcode {
            return Ok(owned(&["-vcodec", "copy"]));
        }

        if let Some(template) = &self.overrides.h264_encoder {
            return templates.evaluate(template, request);
        }

        let video = &self.configuration.video_codec;
        let (w, h) = (video.width, video.height);
        Ok(vec![
            "-profile:v".to_string(),
            video.profile.ffmpeg_name().to_string(),
            "-level:v".to_string(),
            video.level.ffmpeg_name().to_string(),
            "-b:v".to_string(),
            format!("{}k", video.bitrate),
            "-force_key_frames".to_string(),
            keyframe_expression(self.transcoder.keyframe_interval_secs),
            "-r".to_string(),
            video.fps.to_string(),
            "-vf".to_string(),
            format!(
                "scale=w={}:h={}:force_original_aspect_ratio=1,pad={}:{}:(ow-iw)/2:(oh-ih)/2",
                w, h, w, h
            ),
        ])
    }
}

/// Forces a keyframe every `interval_secs`, which bounds fragment duration
pub fn keyframe_expression(interval_secs: u32) -> String {
    format!("expr:gte(t,n_forced*{})", interval_secs)
}
