use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::traits::audio_track::AudioTrack;
use crate::traits::video_track::VideoTrack;

/// Type of capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Screen,
    Camera,
    Mic,
}

/// A source acquired by the capture source registry.
///
/// The registry owns the tracks; the core only borrows them and stops the
/// clones it makes for its own use.
#[derive(Clone)]
pub struct CaptureSource {
    pub kind: SourceKind,
    pub video_track: Option<Arc<dyn VideoTrack>>,
    pub audio_track: Option<Arc<dyn AudioTrack>>,
}

impl CaptureSource {
    /// Screen surface, optionally with its own audio (tab/system audio).
    pub fn screen(video: Arc<dyn VideoTrack>, audio: Option<Arc<dyn AudioTrack>>) -> Self {
        Self {
            kind: SourceKind::Screen,
            video_track: Some(video),
            audio_track: audio,
        }
    }

    pub fn camera(video: Arc<dyn VideoTrack>) -> Self {
        Self {
            kind: SourceKind::Camera,
            video_track: Some(video),
            audio_track: None,
        }
    }

    pub fn microphone(audio: Arc<dyn AudioTrack>) -> Self {
        Self {
            kind: SourceKind::Mic,
            video_track: None,
            audio_track: Some(audio),
        }
    }

    /// Whether any of the source's tracks is still live.
    pub fn is_live(&self) -> bool {
        self.video_track.as_ref().is_some_and(|t| t.is_live())
            || self.audio_track.as_ref().is_some_and(|t| t.is_live())
    }

    pub fn live_video(&self) -> Option<&Arc<dyn VideoTrack>> {
        self.video_track.as_ref().filter(|t| t.is_live())
    }

    pub fn live_audio(&self) -> Option<&Arc<dyn AudioTrack>> {
        self.audio_track.as_ref().filter(|t| t.is_live())
    }
}

impl fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSource")
            .field("kind", &self.kind)
            .field("video_track", &self.video_track.as_ref().map(|t| t.id().to_string()))
            .field("audio_track", &self.audio_track.as_ref().map(|t| t.id().to_string()))
            .field("live", &self.is_live())
            .finish()
    }
}
