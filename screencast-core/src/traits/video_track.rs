use std::sync::Arc;

use crate::models::frame::VideoFrame;
use crate::traits::subscription::Subscription;

/// Called once when a track ends without being asked to.
pub type EndedListener = Arc<dyn Fn() + Send + Sync + 'static>;

/// Called whenever a track has a new frame ready.
pub type FrameListener = Arc<dyn Fn() + Send + Sync + 'static>;

/// A live video track supplied by the capture source registry.
///
/// Implemented by:
/// - `SoftVideoTrack` (screencast-soft)
/// - `CanvasTrack` (the compositing surface's own output track)
pub trait VideoTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Whether the track still delivers frames.
    fn is_live(&self) -> bool;

    /// Native frame size, once the source has reported it.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Most recent frame. Frames are never queued.
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Register for unsolicited termination (the source's owner stopped it).
    fn on_ended(&self, listener: EndedListener) -> Subscription;

    /// Per-frame readiness callback, if the host offers one.
    fn on_frame(&self, _listener: FrameListener) -> Option<Subscription> {
        None
    }

    /// A new handle onto the same source that can be stopped independently.
    fn clone_track(&self) -> Arc<dyn VideoTrack>;

    /// Stop this handle. Only ever called on clones the caller owns.
    fn stop(&self);
}
