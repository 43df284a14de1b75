//! Recording session acquisition
//!
//! Opens the byte source for a recording: a direct connection to the
//! prebuffer socket, or an ffmpeg process writing fragmented MP4 to stdout.
//! Either way the bytes are wrapped in a [`BoxReader`].

use super::arguments::TranscodeArguments;
use crate::mp4::parser::{BoxReader, BoxSource, Mp4Box};
use crate::utils::config::TranscoderConfig;
use crate::utils::error::{RecordingError, RecordingResult};
use async_trait::async_trait;
use std::io;
use std::net::Shutdown;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use url::Url;

/// Releases an owned session resource
pub trait Teardown: Send {
    fn teardown(&mut self) -> io::Result<()>;
}

/// Which kind of resource backs a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Socket,
    Process,
}

/// The one resource a session owns
#[derive(Debug)]
pub enum SessionResource {
    /// Handle on the prebuffer connection, shares the socket with the reader
    Socket(std::net::TcpStream),
    /// The transcoder; its stdout is owned by the reader
    Process(Child),
}

impl SessionResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            SessionResource::Socket(_) => ResourceKind::Socket,
            SessionResource::Process(_) => ResourceKind::Process,
        }
    }
}

impl Teardown for SessionResource {
    fn teardown(&mut self) -> io::Result<()> {
        match self {
            SessionResource::Socket(socket) => socket.shutdown(Shutdown::Both),
            // SIGKILL on unix, no graceful quit
            SessionResource::Process(child) => child.start_kill(),
        }
    }
}

/// Byte stream feeding the box reader
pub type SessionReader = Box<dyn AsyncRead + Unpin + Send>;

/// Box sequence of an open session
pub struct SessionBoxes(BoxReader<SessionReader>);

#[async_trait]
impl BoxSource for SessionBoxes {
    async fn next_box(&mut self) -> io::Result<Option<Mp4Box>> {
        self.0.read_box().await
    }
}

/// An acquired byte source plus its box parser
pub struct Session {
    pub resource: SessionResource,
    pub boxes: SessionBoxes,
}

impl Session {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }
}

/// Acquires sessions for both paths
pub struct SessionFactory<'a> {
    config: &'a TranscoderConfig,
}

impl<'a> SessionFactory<'a> {
    pub fn new(config: &'a TranscoderConfig) -> Self {
        Self { config }
    }

    /// Connect straight to a `tcp://host:port` prebuffer
    pub async fn connect(&self, source_url: &str) -> RecordingResult<Session> {
        let addr = socket_addr(source_url)?;
        tracing::info!("Connecting to prebuffer at {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| RecordingError::Connect {
                addr: addr.clone(),
                source,
            })?;

        // Keep a std handle for shutdown, read through the tokio one
        let std_stream = stream.into_std()?;
        let handle = std_stream.try_clone()?;
        let stream = TcpStream::from_std(std_stream)?;

        let reader: SessionReader = Box::new(stream);
        Ok(Session {
            resource: SessionResource::Socket(handle),
            boxes: SessionBoxes(BoxReader::new(reader, self.config.max_box_size)),
        })
    }

    /// Start ffmpeg and read its stdout
    pub fn spawn(&self, args: &TranscodeArguments) -> RecordingResult<Session> {
        let program = self.config.ffmpeg_path.to_string_lossy().to_string();
        let args = args.command_args();

        tracing::info!("Starting FFmpeg transcoder: {:?}", args);

        let spawn_error = |source: io::Error| RecordingError::Spawn {
            program: program.clone(),
            source,
        };

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.start_kill();
                return Err(spawn_error(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "Failed to capture FFmpeg stdout",
                )));
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        tracing::debug!("FFmpeg: {}", line.trim());
                    }
                }
            });
        }

        let reader: SessionReader = Box::new(stdout);
        Ok(Session {
            resource: SessionResource::Process(child),
            boxes: SessionBoxes(BoxReader::new(reader, self.config.max_box_size)),
        })
    }
}

/// `host:port` from a `tcp://` url
fn socket_addr(source_url: &str) -> RecordingResult<String> {
    let invalid = |reason: &str| RecordingError::InvalidSourceUrl {
        url: source_url.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(source_url).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "tcp" {
        return Err(invalid("expected a tcp:// url"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url.port().ok_or_else(|| invalid("missing port"))?;

    // IPv6 hosts keep their brackets in host_str
    Ok(format!("{}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_socket_addr() {
        assert_eq!(socket_addr("tcp://127.0.0.1:8554").unwrap(), "127.0.0.1:8554");
        assert_eq!(socket_addr("tcp://camera.local:1234").unwrap(), "camera.local:1234");
        assert_eq!(socket_addr("tcp://[::1]:9000").unwrap(), "[::1]:9000");
    }

    #[test]
    fn test_socket_addr_rejects_bad_urls() {
        for url in ["rtsp://host:554/live", "tcp://host", "not a url"] {
            assert!(matches!(
                socket_addr(url),
                Err(RecordingError::InvalidSourceUrl { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_connect_refused_is_distinguishable() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TranscoderConfig::default();
        let result = SessionFactory::new(&config)
            .connect(&format!("tcp://127.0.0.1:{}", port))
            .await;

        match result {
            Err(err @ RecordingError::Connect { .. }) => assert!(err.is_resource_failure()),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinguishable() {
        let config = TranscoderConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-for-tests"),
            ..TranscoderConfig::default()
        };
        let args = TranscodeArguments {
            input: vec![],
            audio: vec![],
            video: vec![],
        };

        let result = SessionFactory::new(&config).spawn(&args);
        assert!(matches!(result, Err(RecordingError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_socket_teardown_ends_reader() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without writing
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(socket);
        });

        let config = TranscoderConfig::default();
        let mut session = SessionFactory::new(&config)
            .connect(&format!("tcp://127.0.0.1:{}", port))
            .await
            .unwrap();
        assert_eq!(session.kind(), ResourceKind::Socket);

        session.resource.teardown().unwrap();
        let next = session.boxes.next_box().await.unwrap();
        assert!(next.is_none());
        server.abort();
    }
}
