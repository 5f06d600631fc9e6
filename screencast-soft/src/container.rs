//! `video/x-screencast-mjpeg` container.
//!
//! ```text
//! "SCMJ" | version u8
//! record*: tag u8 | timestamp_us u64 LE | payload_len u32 LE | payload
//!   'V' payload: JPEG bytes
//!   'A' payload: sample_rate u32 LE | channels u16 LE | 16-bit PCM LE
//! ```
//!
//! The header is emitted with the first chunk only, so the concatenation of
//! all chunks of a recording is one valid stream.

use std::time::Duration;

use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"SCMJ";
pub const VERSION: u8 = 1;
pub const MIME_TYPE: &str = "video/x-screencast-mjpeg";
pub const CODECS_MIME_TYPE: &str = "video/x-screencast-mjpeg;codecs=mjpeg,pcm";

const TAG_VIDEO: u8 = b'V';
const TAG_AUDIO: u8 = b'A';
const RECORD_HEADER_LEN: usize = 1 + 8 + 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("missing SCMJ header")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("record truncated at byte {0}")]
    Truncated(usize),

    #[error("unknown record tag {tag:#04x} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Video {
        timestamp: Duration,
        jpeg: Vec<u8>,
    },
    Audio {
        timestamp: Duration,
        sample_rate: u32,
        channels: u16,
        pcm: Vec<u8>,
    },
}

impl Record {
    pub fn timestamp(&self) -> Duration {
        match self {
            Self::Video { timestamp, .. } | Self::Audio { timestamp, .. } => *timestamp,
        }
    }
}

/// Accumulates records until the next flush.
#[derive(Debug, Default)]
pub struct RecordWriter {
    pending: Vec<u8>,
    header_written: bool,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_video(&mut self, timestamp: Duration, jpeg: &[u8]) {
        self.push(TAG_VIDEO, timestamp, &[], jpeg);
    }

    pub fn push_audio(&mut self, timestamp: Duration, sample_rate: u32, channels: u16, pcm: &[u8]) {
        let mut prefix = [0u8; 6];
        prefix[..4].copy_from_slice(&sample_rate.to_le_bytes());
        prefix[4..].copy_from_slice(&channels.to_le_bytes());
        self.push(TAG_AUDIO, timestamp, &prefix, pcm);
    }

    fn push(&mut self, tag: u8, timestamp: Duration, prefix: &[u8], payload: &[u8]) {
        if !self.header_written {
            self.pending.extend_from_slice(MAGIC);
            self.pending.push(VERSION);
            self.header_written = true;
        }
        let len = (prefix.len() + payload.len()) as u32;
        self.pending.push(tag);
        self.pending
            .extend_from_slice(&(timestamp.as_micros() as u64).to_le_bytes());
        self.pending.extend_from_slice(&len.to_le_bytes());
        self.pending.extend_from_slice(prefix);
        self.pending.extend_from_slice(payload);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take everything written since the last flush.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

/// Parse a complete stream.
pub fn read_records(bytes: &[u8]) -> Result<Vec<Record>, ContainerError> {
    if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ContainerError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(ContainerError::UnsupportedVersion(version));
    }

    let mut records = Vec::new();
    let mut offset = MAGIC.len() + 1;
    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + RECORD_HEADER_LEN)
            .ok_or(ContainerError::Truncated(offset))?;
        let tag = header[0];
        let timestamp = Duration::from_micros(u64::from_le_bytes(le_array(&header[1..9])));
        let len = u32::from_le_bytes(le_array(&header[9..13])) as usize;

        let start = offset + RECORD_HEADER_LEN;
        let payload = bytes
            .get(start..start + len)
            .ok_or(ContainerError::Truncated(offset))?;

        records.push(match tag {
            TAG_VIDEO => Record::Video {
                timestamp,
                jpeg: payload.to_vec(),
            },
            TAG_AUDIO if payload.len() >= 6 => Record::Audio {
                timestamp,
                sample_rate: u32::from_le_bytes(le_array(&payload[..4])),
                channels: u16::from_le_bytes(le_array(&payload[4..6])),
                pcm: payload[6..].to_vec(),
            },
            TAG_AUDIO => return Err(ContainerError::Truncated(offset)),
            tag => return Err(ContainerError::UnknownTag { tag, offset }),
        });
        offset = start + len;
    }
    Ok(records)
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
