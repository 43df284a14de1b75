//! Recording session pipeline
//!
//! This module turns a motion recording request into a live sequence of
//! fragmented MP4 fragments:
//! - compatibility check between passthrough and transcode
//! - ffmpeg argument construction for the transcode path
//! - socket or process acquisition
//! - fragment streaming with guaranteed resource cleanup

pub mod arguments;
pub mod compat;
pub mod context;
pub mod handler;
pub mod lifecycle;
pub mod session;
pub mod types;

pub use arguments::{ArgumentBuilder, ArgumentOverrides, TranscodeArguments};
pub use compat::{is_passthrough_compatible, SourceTraits, StreamDecision};
pub use context::{
    AlertSink, LogAlerts, MediaSourceProvider, MemoryPreferences, PlaceholderTemplate,
    PreferenceStore, RecordingContext, StaticMediaSource, TemplateEvaluator,
};
pub use handler::handle_fragments_request;
pub use lifecycle::{FragmentStream, ResourceGuard};
pub use session::{ResourceKind, Session, SessionFactory, SessionResource, Teardown};
pub use types::{MediaSourceDescriptor, RecordingConfiguration};
