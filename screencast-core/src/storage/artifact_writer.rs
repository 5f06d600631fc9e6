use std::fs;
use std::path::{Path, PathBuf};

use super::metadata;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;

/// Paths produced by [`write_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRecording {
    pub artifact_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Write a finished recording into `dir` as `{id}.{ext}` plus its
/// metadata sidecar. The directory is created if missing.
pub fn write_artifact(result: &RecordingResult, dir: &Path) -> Result<WrittenRecording, CaptureError> {
    fs::create_dir_all(dir)
        .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;

    let file_name = format!("{}.{}", result.metadata.id, result.artifact.file_extension());
    let artifact_path = dir.join(file_name);
    fs::write(&artifact_path, &result.artifact.bytes)
        .map_err(|e| CaptureError::StorageError(format!("failed to write recording: {}", e)))?;

    let metadata_path = metadata::write_metadata(&result.metadata, &artifact_path)?;
    log::info!(
        "wrote {} ({} bytes)",
        artifact_path.display(),
        result.artifact.len()
    );

    Ok(WrittenRecording {
        artifact_path,
        metadata_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::RecorderConfiguration;
    use crate::models::recording_result::{EncodedArtifact, RecordingMetadata};
    use std::time::Duration;

    fn result() -> RecordingResult {
        let artifact = EncodedArtifact {
            bytes: vec![1, 2, 3, 4],
            mime_type: "video/webm".into(),
        };
        let composition = RecorderConfiguration::default().composition(1280, 720);
        let metadata = RecordingMetadata::describe(
            &artifact,
            "video/webm;codecs=vp8,opus",
            Duration::from_secs(3),
            2,
            &composition,
            false,
        );
        RecordingResult {
            artifact,
            duration: Duration::from_secs(3),
            metadata,
        }
    }

    #[test]
    fn writes_artifact_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let result = result();

        let written = write_artifact(&result, &out).unwrap();
        assert_eq!(written.artifact_path.extension().unwrap(), "webm");
        assert_eq!(fs::read(&written.artifact_path).unwrap(), vec![1, 2, 3, 4]);

        let metadata = metadata::read_metadata(&written.artifact_path).unwrap();
        assert_eq!(metadata, result.metadata);
        assert_eq!(metadata.byte_length, 4);
        assert_eq!(metadata.canvas_width, 1280);
    }
}
