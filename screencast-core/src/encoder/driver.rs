use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::chunk_log::ChunkLog;
use super::codec::{self, CodecProfile};
use crate::models::error::CaptureError;
use crate::models::recording_result::EncodedArtifact;
use crate::traits::encoder_backend::{ChunkCallback, EncoderBackend, EncoderInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Idle,
    Running,
    Paused,
}

/// Drives an [`EncoderBackend`] for one recording at a time and collects
/// its output.
pub struct EncoderDriver<E: EncoderBackend> {
    backend: E,
    profile: Option<CodecProfile>,
    chunks: Arc<Mutex<ChunkLog>>,
    state: EncoderState,
    stop_grace: Duration,
}

impl<E: EncoderBackend> EncoderDriver<E> {
    pub fn new(backend: E, stop_grace: Duration) -> Self {
        Self {
            backend,
            profile: None,
            chunks: Arc::new(Mutex::new(ChunkLog::new())),
            state: EncoderState::Idle,
            stop_grace,
        }
    }

    pub fn backend(&self) -> &E {
        &self.backend
    }

    pub fn negotiate(&self, preferences: &[String]) -> Result<CodecProfile, CaptureError> {
        codec::negotiate(&self.backend, preferences)
    }

    pub fn profile(&self) -> Option<&CodecProfile> {
        self.profile.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state != EncoderState::Idle
    }

    /// Start encoding `input`. Chunks from any earlier recording are discarded.
    pub fn start(&mut self, profile: CodecProfile, input: EncoderInput) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::EncoderFailure("encoder already running".into()));
        }
        self.chunks.lock().clear();

        let chunks = Arc::clone(&self.chunks);
        let on_data: ChunkCallback = Arc::new(move |data: Vec<u8>| {
            chunks.lock().append(data);
        });

        self.backend.start(profile.mime_type(), input, on_data)?;
        log::info!("encoder started ({})", profile);
        self.profile = Some(profile);
        self.state = EncoderState::Running;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == EncoderState::Running {
            self.backend.pause();
            self.state = EncoderState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == EncoderState::Paused {
            self.backend.resume();
            self.state = EncoderState::Running;
        }
    }

    /// Finish the recording and return the artifact.
    ///
    /// Ingestion is halted first through `halt_sources`, then the backend is
    /// asked for its buffered data and finalized after the grace delay.
    pub fn stop(&mut self, halt_sources: impl FnOnce()) -> Result<EncodedArtifact, CaptureError> {
        if !self.is_running() {
            return Err(CaptureError::EncoderFailure("encoder not running".into()));
        }
        self.state = EncoderState::Idle;

        halt_sources();
        self.backend.request_data();
        if !self.stop_grace.is_zero() {
            thread::sleep(self.stop_grace);
        }
        self.backend.stop()?;

        let container = self
            .profile
            .as_ref()
            .map(|p| p.container().to_string())
            .unwrap_or_default();
        let chunks = self.chunks.lock();
        log::info!("encoder stopped: {} chunks, {} bytes", chunks.len(), chunks.total_bytes());
        chunks.to_artifact(&container)
    }

    /// Stop the backend without assembling an artifact.
    pub fn abort(&mut self) {
        if !self.is_running() {
            return;
        }
        self.state = EncoderState::Idle;
        if let Err(e) = self.backend.stop() {
            log::warn!("encoder abort: {}", e);
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn bytes_received(&self) -> u64 {
        self.chunks.lock().total_bytes()
    }
}
