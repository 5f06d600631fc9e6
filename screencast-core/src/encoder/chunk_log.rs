use crate::models::error::CaptureError;
use crate::models::recording_result::{EncodedArtifact, EncodedChunk};

/// Encoded chunks in arrival order.
#[derive(Debug, Default)]
pub struct ChunkLog {
    chunks: Vec<EncodedChunk>,
    next_sequence: u64,
    total_bytes: u64,
}

impl ChunkLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored and get no sequence number.
    pub fn append(&mut self, data: Vec<u8>) -> Option<u64> {
        if data.is_empty() {
            return None;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.total_bytes += data.len() as u64;
        self.chunks.push(EncodedChunk { sequence, data });
        Some(sequence)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunks(&self) -> &[EncodedChunk] {
        &self.chunks
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.next_sequence = 0;
        self.total_bytes = 0;
    }

    /// Concatenate everything received so far.
    pub fn to_artifact(&self, mime_type: &str) -> Result<EncodedArtifact, CaptureError> {
        if self.chunks.is_empty() {
            return Err(CaptureError::EmptyRecording);
        }
        let artifact = EncodedArtifact::from_chunks(&self.chunks, mime_type);
        if artifact.is_empty() {
            return Err(CaptureError::EmptyRecording);
        }
        Ok(artifact)
    }
}
