use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::config::{Anchor, Layout};

/// Encoded bytes as delivered by the encoder, tagged with arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// The final encoded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    /// Container mime type, without codec parameters (e.g. `video/webm`).
    pub mime_type: String,
}

impl EncodedArtifact {
    /// Concatenate chunks in sequence order.
    pub fn from_chunks(chunks: &[EncodedChunk], mime_type: &str) -> Self {
        let total: usize = chunks.iter().map(|c| c.data.len()).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk.data);
        }
        Self {
            bytes,
            mime_type: mime_type.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 hex digest of the artifact bytes.
    pub fn checksum(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// File extension matching the container.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/x-matroska" => "mkv",
            "video/x-screencast-mjpeg" => "scmj",
            _ => "bin",
        }
    }
}

/// Result emitted when a recording completes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub artifact: EncodedArtifact,
    /// Elapsed recording time, paused intervals excluded.
    pub duration: Duration,
    pub metadata: RecordingMetadata,
}

/// Metadata stored alongside a recording.
///
/// Serializable for JSON export to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub duration_secs: f64,
    pub mime_type: String,
    pub codec_profile: String,
    pub byte_length: u64,
    pub checksum: String,
    pub chunk_count: usize,
    pub layout: Layout,
    pub anchor: Anchor,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub has_audio: bool,
}

impl RecordingMetadata {
    pub fn describe(
        artifact: &EncodedArtifact,
        codec_profile: &str,
        duration: Duration,
        chunk_count: usize,
        composition: &super::config::CompositionConfig,
        has_audio: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_secs: duration.as_secs_f64(),
            mime_type: artifact.mime_type.clone(),
            codec_profile: codec_profile.to_string(),
            byte_length: artifact.len() as u64,
            checksum: artifact.checksum(),
            chunk_count,
            layout: composition.layout,
            anchor: composition.overlay_anchor,
            canvas_width: composition.canvas_width,
            canvas_height: composition.canvas_height,
            has_audio,
        }
    }
}

/// Counters for debugging a recording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderDiagnostics {
    pub frames_composited: u64,
    pub frame_pushes: u64,
    pub audio_mix_cycles: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CompositionConfig;

    fn chunk(sequence: u64, data: &[u8]) -> EncodedChunk {
        EncodedChunk {
            sequence,
            data: data.to_vec(),
        }
    }

    #[test]
    fn artifact_concatenates_in_order() {
        let chunks = vec![chunk(0, b"ab"), chunk(1, b"cd"), chunk(2, b"e")];
        let artifact = EncodedArtifact::from_chunks(&chunks, "video/webm");
        assert_eq!(artifact.bytes, b"abcde");
        assert_eq!(artifact.file_extension(), "webm");
    }

    #[test]
    fn checksum_is_sha256_hex() {
        let artifact = EncodedArtifact {
            bytes: b"abc".to_vec(),
            mime_type: "video/mp4".into(),
        };
        assert_eq!(
            artifact.checksum(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let artifact = EncodedArtifact {
            bytes: vec![1, 2, 3],
            mime_type: "video/webm".into(),
        };
        let composition = CompositionConfig::new(1280, 720, Layout::Circle, Anchor::TopLeft, 30);
        let metadata = RecordingMetadata::describe(
            &artifact,
            "video/webm;codecs=vp9,opus",
            Duration::from_millis(1500),
            1,
            &composition,
            true,
        );

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"durationSecs\":1.5"));
        assert!(json.contains("\"layout\":\"circle\""));
        let parsed: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }
}
