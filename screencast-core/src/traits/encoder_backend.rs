use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::traits::audio_track::AudioTrack;
use crate::traits::video_track::VideoTrack;

/// Receives encoded bytes as the backend produces them.
pub type ChunkCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// Tracks handed to the encoder for one recording.
#[derive(Clone)]
pub struct EncoderInput {
    pub video: Arc<dyn VideoTrack>,
    pub audio: Option<Arc<dyn AudioTrack>>,
    pub frame_rate: u32,
}

/// Host media encoder.
///
/// Implemented by:
/// - `SoftEncoder` (screencast-soft)
pub trait EncoderBackend: Send {
    /// Whether the host can encode the given mime type (with codecs parameter).
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Begin encoding. Data is delivered incrementally via `on_data`, in order.
    fn start(&mut self, mime_type: &str, input: EncoderInput, on_data: ChunkCallback) -> Result<(), CaptureError>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Flush whatever is buffered through `on_data` now.
    fn request_data(&mut self);

    /// Finalize. Any remaining data is delivered before this returns.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
