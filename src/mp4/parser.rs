//! Incremental MP4 box reader
//!
//! Splits a live byte stream into top-level ISO BMFF boxes. Each box keeps
//! its raw header so that `header ++ data` is a byte-exact copy of what was
//! read.

use async_trait::async_trait;
use std::fmt;
use std::io::{self, ErrorKind};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Four-character box type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: BoxType = BoxType(*b"ftyp");
    pub const MOOV: BoxType = BoxType(*b"moov");
    pub const MOOF: BoxType = BoxType(*b"moof");
    pub const MDAT: BoxType = BoxType(*b"mdat");

    /// `moov` closes the init segment, `mdat` closes each media fragment
    pub fn is_fragment_boundary(&self) -> bool {
        *self == Self::MOOV || *self == Self::MDAT
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A complete top-level box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Box {
    /// Raw header (8 bytes, or 16 with a 64-bit size)
    pub header: Vec<u8>,
    pub box_type: BoxType,
    /// Payload following the header
    pub data: Vec<u8>,
}

impl Mp4Box {
    /// Build a box around `data`, with a 64-bit size header when the
    /// compact one cannot hold it
    pub fn new(box_type: BoxType, data: Vec<u8>) -> Self {
        Self {
            header: encode_header(box_type, data.len() as u64),
            box_type,
            data,
        }
    }

    /// Total size on the wire
    pub fn len(&self) -> usize {
        self.header.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode_header(box_type: BoxType, payload_len: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(16);
    match u32::try_from(payload_len.saturating_add(8)) {
        Ok(size) => {
            header.extend_from_slice(&size.to_be_bytes());
            header.extend_from_slice(&box_type.0);
        }
        Err(_) => {
            header.extend_from_slice(&1u32.to_be_bytes());
            header.extend_from_slice(&box_type.0);
            header.extend_from_slice(&payload_len.saturating_add(16).to_be_bytes());
        }
    }
    header
}

/// Lazy, ordered sequence of boxes
///
/// `Ok(None)` marks a clean end of stream.
#[async_trait]
pub trait BoxSource: Send {
    async fn next_box(&mut self) -> io::Result<Option<Mp4Box>>;
}

/// Reads boxes from any async byte stream
pub struct BoxReader<R> {
    reader: R,
    max_box_size: u64,
    boxes_read: u64,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin + Send> BoxReader<R> {
    pub fn new(reader: R, max_box_size: u64) -> Self {
        Self {
            reader,
            max_box_size,
            boxes_read: 0,
            bytes_read: 0,
        }
    }

    pub fn boxes_read(&self) -> u64 {
        self.boxes_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next box. Returns None if the stream ends on a box boundary.
    pub async fn read_box(&mut self) -> io::Result<Option<Mp4Box>> {
        let mut header = vec![0u8; 8];
        if !self.fill_or_eof(&mut header).await? {
            return Ok(None);
        }

        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let box_type = BoxType([header[4], header[5], header[6], header[7]]);

        let data = match size32 {
            // Extends to end of stream
            0 => {
                let mut data = Vec::new();
                (&mut self.reader)
                    .take(self.max_box_size.saturating_add(1))
                    .read_to_end(&mut data)
                    .await?;
                if data.len() as u64 > self.max_box_size {
                    return Err(io::Error::new(
                        ErrorKind::InvalidData,
                        format!(
                            "box {} runs to end of stream past limit {}",
                            box_type, self.max_box_size
                        ),
                    ));
                }
                data
            }
            1 => {
                let mut large = [0u8; 8];
                self.reader.read_exact(&mut large).await?;
                header.extend_from_slice(&large);
                let size = u64::from_be_bytes(large);
                self.read_payload(box_type, size, 16).await?
            }
            size => self.read_payload(box_type, size as u64, 8).await?,
        };

        self.boxes_read += 1;
        self.bytes_read += (header.len() + data.len()) as u64;
        tracing::trace!("mp4 box {} ({} bytes)", box_type, header.len() + data.len());

        Ok(Some(Mp4Box {
            header,
            box_type,
            data,
        }))
    }

    async fn read_payload(
        &mut self,
        box_type: BoxType,
        size: u64,
        header_size: u64,
    ) -> io::Result<Vec<u8>> {
        if size < header_size {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("box {} declares size {} below its header", box_type, size),
            ));
        }
        if size > self.max_box_size {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "box {} declares size {} above limit {}",
                    box_type, size, self.max_box_size
                ),
            ));
        }

        let mut data = vec![0u8; (size - header_size) as usize];
        self.reader.read_exact(&mut data).await?;
        Ok(data)
    }

    /// Fill `buf` completely. Returns false on EOF before the first byte,
    /// errors on EOF partway through.
    async fn fill_or_eof(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("stream ended inside a box header ({} of 8 bytes)", filled),
                ));
            }
            filled += n;
        }
        Ok(true)
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> BoxSource for BoxReader<R> {
    async fn next_box(&mut self) -> io::Result<Option<Mp4Box>> {
        self.read_box().await
    }
}
