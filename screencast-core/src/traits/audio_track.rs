use std::sync::Arc;

use crate::traits::subscription::Subscription;
use crate::traits::video_track::EndedListener;

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of channels (1 = mono, 2 = stereo interleaved).
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// A live audio track: screen audio, microphone, or the mixer output.
pub trait AudioTrack: Send + Sync {
    fn id(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Receive buffers until unsubscribed or the track stops.
    ///
    /// The callback fires on the producer's thread; keep processing minimal.
    fn subscribe(&self, callback: AudioBufferCallback) -> Subscription;

    fn on_ended(&self, listener: EndedListener) -> Subscription;

    fn clone_track(&self) -> Arc<dyn AudioTrack>;

    fn stop(&self);
}
