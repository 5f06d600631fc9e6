use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::frame::VideoFrame;
use crate::traits::subscription::{ListenerSet, Subscription};
use crate::traits::video_track::{EndedListener, FrameListener, VideoTrack};

type Listener = dyn Fn() + Send + Sync;

/// When the canvas announces new frames to its consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Every published frame is announced.
    Automatic,
    /// Frames are announced only on an explicit [`CanvasTrack::request_frame`].
    Manual,
}

struct CanvasInner {
    id: String,
    live: AtomicBool,
    dimensions: Mutex<(u32, u32)>,
    latest: Mutex<Option<VideoFrame>>,
    mode: Mutex<CaptureMode>,
    frame_pushes: AtomicU64,
    frame_listeners: ListenerSet<Listener>,
    ended_listeners: ListenerSet<Listener>,
}

/// Output track of the compositing surface.
///
/// Holds a single slot: publishing a frame replaces whatever was there, so
/// a slow consumer only ever sees the newest composite.
#[derive(Clone)]
pub struct CanvasTrack {
    inner: Arc<CanvasInner>,
}

impl CanvasTrack {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(CanvasInner {
                id: format!("canvas-{}", uuid::Uuid::new_v4()),
                live: AtomicBool::new(true),
                dimensions: Mutex::new((width, height)),
                latest: Mutex::new(None),
                mode: Mutex::new(CaptureMode::Automatic),
                frame_pushes: AtomicU64::new(0),
                frame_listeners: ListenerSet::new(),
                ended_listeners: ListenerSet::new(),
            }),
        }
    }

    /// Replace the latest frame.
    pub fn publish(&self, frame: VideoFrame) {
        if !self.is_live() {
            return;
        }
        *self.inner.dimensions.lock() = frame.dimensions();
        *self.inner.latest.lock() = Some(frame);
        if self.capture_mode() == CaptureMode::Automatic {
            self.notify_frame();
        }
    }

    /// Explicitly push the current frame to consumers.
    pub fn request_frame(&self) {
        if !self.is_live() {
            return;
        }
        self.inner.frame_pushes.fetch_add(1, Ordering::Relaxed);
        self.notify_frame();
    }

    pub fn set_capture_mode(&self, mode: CaptureMode) {
        *self.inner.mode.lock() = mode;
    }

    pub fn capture_mode(&self) -> CaptureMode {
        *self.inner.mode.lock()
    }

    pub fn set_dimensions(&self, width: u32, height: u32) {
        *self.inner.dimensions.lock() = (width, height);
    }

    pub fn frame_pushes(&self) -> u64 {
        self.inner.frame_pushes.load(Ordering::Relaxed)
    }

    /// End the track and notify ended listeners once.
    pub fn end(&self) {
        if self.inner.live.swap(false, Ordering::SeqCst) {
            self.inner.frame_listeners.clear();
            for listener in self.inner.ended_listeners.snapshot() {
                listener();
            }
        }
    }

    fn notify_frame(&self) {
        for listener in self.inner.frame_listeners.snapshot() {
            listener();
        }
    }
}

impl VideoTrack for CanvasTrack {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(*self.inner.dimensions.lock())
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.inner.latest.lock().clone()
    }

    fn on_ended(&self, listener: EndedListener) -> Subscription {
        self.inner.ended_listeners.add(listener)
    }

    fn on_frame(&self, listener: FrameListener) -> Option<Subscription> {
        Some(self.inner.frame_listeners.add(listener))
    }

    fn clone_track(&self) -> Arc<dyn VideoTrack> {
        Arc::new(self.clone())
    }

    fn stop(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
        self.inner.frame_listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(track: &CanvasTrack) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = track
            .on_frame(Arc::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        (hits, sub)
    }

    #[test]
    fn latest_frame_wins() {
        let track = CanvasTrack::new(4, 4);
        track.publish(VideoFrame::solid(4, 4, [1, 1, 1, 255]));
        track.publish(VideoFrame::solid(8, 2, [2, 2, 2, 255]));

        let frame = track.latest_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some([2, 2, 2, 255]));
        assert_eq!(track.dimensions(), Some((8, 2)));
    }

    #[test]
    fn manual_mode_announces_only_on_request() {
        let track = CanvasTrack::new(4, 4);
        let (hits, _sub) = counting_listener(&track);

        track.publish(VideoFrame::solid(4, 4, [0, 0, 0, 255]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        track.set_capture_mode(CaptureMode::Manual);
        track.publish(VideoFrame::solid(4, 4, [0, 0, 0, 255]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        track.request_frame();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(track.frame_pushes(), 1);
    }

    #[test]
    fn end_notifies_once_and_stops_publishing() {
        let track = CanvasTrack::new(4, 4);
        let ended = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&ended);
        let _sub = track.on_ended(Arc::new(move || {
            e.fetch_add(1, Ordering::SeqCst);
        }));

        track.end();
        track.end();
        track.publish(VideoFrame::solid(4, 4, [0, 0, 0, 255]));

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(track.latest_frame().is_none());
        assert!(!track.is_live());
    }
}
