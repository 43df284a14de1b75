//! Fragment request handling
//!
//! Resolves the recording source for a motion event, decides between
//! passthrough and transcode, and opens the fragment stream.

use super::arguments::{ArgumentBuilder, ArgumentOverrides};
use super::compat::{SourceTraits, StreamDecision};
use super::context::{keys, RecordingContext};
use super::lifecycle::FragmentStream;
use super::session::{Session, SessionFactory};
use super::types::{MediaSourceDescriptor, MediaSourceRequest, RecordingConfiguration};
use crate::utils::error::RecordingResult;
use tracing::Instrument;
use uuid::Uuid;

/// Open a fragment stream for one recording request
///
/// Fails before any fragment is produced when the source cannot be resolved
/// or its socket/process cannot be acquired. Once this returns, the stream
/// only ever ends normally.
pub async fn handle_fragments_request(
    context: &RecordingContext,
    configuration: &RecordingConfiguration,
) -> RecordingResult<FragmentStream> {
    let session_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "recording",
        session = %session_id,
        device = %context.device_name
    );

    let session = open_session(context, configuration)
        .instrument(span.clone())
        .await?;
    Ok(FragmentStream::from_session(session, session_id, span))
}

async fn open_session(
    context: &RecordingContext,
    configuration: &RecordingConfiguration,
) -> RecordingResult<Session> {
    tracing::info!("Recording session starting: {:?}", configuration);

    let source = resolve_source(context, configuration)
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve recording source: {}", e);
            e
        })?;

    if !source.is_prebuffered() {
        context.alerts.alert(&format!(
            "{} is not prebuffered. Please install and enable the Rebroadcast plugin.",
            context.device_name
        ));
    }

    let traits = SourceTraits::inspect(&source, context.force_transcode());
    let factory = SessionFactory::new(&context.transcoder);

    let session = match traits.evaluate() {
        StreamDecision::Passthrough => {
            tracing::info!("Prebuffer is tcp/mp4/h264/aac compatible, using direct tcp");
            factory.connect(&source.url).await?
        }
        StreamDecision::Transcode => {
            let overrides = ArgumentOverrides {
                video_decoder: context.preference(keys::VIDEO_DECODER_ARGUMENTS),
                h264_encoder: context.preference(keys::H264_ENCODER_ARGUMENTS),
            };
            let args = ArgumentBuilder::new(configuration, &traits, &context.transcoder)
                .with_overrides(overrides)
                .build(&source, context.templates.as_ref())?;
            factory.spawn(&args)?
        }
    };

    tracing::info!("Motion recording started ({:?})", session.kind());
    Ok(session)
}

/// Find the configured recording stream and resolve it as an mp4 source
async fn resolve_source(
    context: &RecordingContext,
    configuration: &RecordingConfiguration,
) -> RecordingResult<MediaSourceDescriptor> {
    let mut stream_id = None;
    if let Some(channel) = context.preference(keys::RECORDING_CHANNEL) {
        let streams = context.sources.stream_options().await?;
        match streams.into_iter().find(|stream| stream.name == channel) {
            Some(stream) => stream_id = Some(stream.id),
            None => tracing::warn!(
                "Recording channel {} not found, using the default stream",
                channel
            ),
        }
    }

    let request = MediaSourceRequest {
        id: stream_id,
        prebuffer: configuration.media_container_configuration.prebuffer_length,
        container: "mp4".to_string(),
    };
    context.sources.media_source(&request).await
}
