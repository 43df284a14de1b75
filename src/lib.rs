//! HKSV fragments - fragmented MP4 recording sessions for camera motion events.
//!
//! A recording request either forwards a prebuffered fMP4 socket unchanged
//! or pipes the camera through ffmpeg, and in both cases yields a pull-based
//! sequence of boundary-aligned fragments.

pub mod mp4;
pub mod recording;
pub mod utils;

pub use mp4::{Fragment, Mp4Box};
pub use recording::{handle_fragments_request, FragmentStream, RecordingContext};
pub use utils::{RecordingError, RecordingResult, TranscoderConfig};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hksv_fragments=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting HKSV fragments v{}", env!("CARGO_PKG_VERSION"));
}
