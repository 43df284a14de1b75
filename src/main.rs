use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::fs::File;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio::signal;

use hksv_fragments::recording::{
    handle_fragments_request, MediaSourceDescriptor, MemoryPreferences, RecordingConfiguration,
    RecordingContext, StaticMediaSource,
};
use hksv_fragments::TranscoderConfig;

#[derive(Parser, Debug)]
#[command(name = "hksv-fragments")]
#[command(about = "Record a camera source as a sequence of fragmented MP4 fragments")]
struct Args {
    /// Media source description (ffmpeg input JSON)
    #[arg(short, long)]
    source: PathBuf,

    /// Recording configuration JSON
    #[arg(short, long)]
    recording: PathBuf,

    /// Stored preferences JSON (string keys and values)
    #[arg(short, long)]
    preferences: Option<PathBuf>,

    /// Transcoder configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Camera name used in logs
    #[arg(long, default_value = "camera")]
    name: String,

    /// Stop after this many fragments
    #[arg(long)]
    max_fragments: Option<u64>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    hksv_fragments::init_logging();
    let args = Args::parse();

    let descriptor: MediaSourceDescriptor = read_json(&args.source)?;
    let configuration: RecordingConfiguration = read_json(&args.recording)?;
    let preferences: HashMap<String, String> = match &args.preferences {
        Some(path) => read_json(path)?,
        None => HashMap::new(),
    };
    let transcoder = match &args.config {
        Some(path) => TranscoderConfig::load(path)?,
        None => TranscoderConfig::from_env()?,
    };

    let context = RecordingContext::new(
        args.name.clone(),
        Arc::new(StaticMediaSource::new(descriptor)),
        Arc::new(MemoryPreferences::from(preferences)),
        transcoder,
    );

    let mut output: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let mut fragments = handle_fragments_request(&context, &configuration).await?;
    let mut written = 0u64;
    let mut bytes = 0usize;

    loop {
        let fragment = tokio::select! {
            fragment = fragments.next_fragment() => fragment,
            _ = signal::ctrl_c() => {
                eprintln!("\nStopping recording...");
                break;
            }
        };
        let Some(fragment) = fragment else {
            break;
        };

        output.write_all(&fragment.data).await?;
        written += 1;
        bytes += fragment.len();
        tracing::debug!("Fragment {}: {} bytes", written, fragment.len());

        if args.max_fragments.is_some_and(|max| written >= max) {
            break;
        }
    }

    fragments.close();
    output.flush().await?;
    tracing::info!("Wrote {} fragments ({} bytes)", written, bytes);
    Ok(())
}
