//! Synthetic video source.
//!
//! Produces frames on a dedicated ticker thread and exposes them through
//! [`VideoTrack`] handles. The source plays the role of a capture registry
//! entry: it owns the producer and can be ended by its owner, which fires
//! the ended listeners of every handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use screencast_core::models::error::CaptureError;
use screencast_core::models::frame::VideoFrame;
use screencast_core::render::ticker::Ticker;
use screencast_core::traits::subscription::{ListenerSet, Subscription};
use screencast_core::traits::video_track::{EndedListener, FrameListener, VideoTrack};

type Listener = dyn Fn() + Send + Sync;

/// What a [`SoftVideoSource`] draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// One opaque color.
    Solid([u8; 4]),
    /// Vertical color bars scrolling one bar per second.
    Bars,
}

impl Pattern {
    pub fn render(self, width: u32, height: u32, frame_index: u64, fps: u32) -> VideoFrame {
        match self {
            Self::Solid(rgba) => VideoFrame::solid(width, height, rgba),
            Self::Bars => {
                const BARS: [[u8; 4]; 6] = [
                    [230, 230, 230, 255],
                    [230, 230, 0, 255],
                    [0, 230, 230, 255],
                    [0, 230, 0, 255],
                    [230, 0, 230, 255],
                    [0, 0, 230, 255],
                ];
                let bar_width = (width / BARS.len() as u32).max(1);
                let shift = (frame_index / fps.max(1) as u64) as usize;
                let image = image::RgbaImage::from_fn(width.max(1), height.max(1), |x, _| {
                    image::Rgba(BARS[((x / bar_width) as usize + shift) % BARS.len()])
                });
                VideoFrame::from_rgba_image(image)
            }
        }
    }
}

struct SourceInner {
    name: String,
    latest: Mutex<Option<VideoFrame>>,
    dimensions: Mutex<Option<(u32, u32)>>,
    ended: AtomicBool,
    frames: AtomicU64,
    clones: AtomicU64,
    ended_listeners: ListenerSet<Listener>,
    frame_listeners: ListenerSet<Listener>,
}

impl SourceInner {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            latest: Mutex::new(None),
            dimensions: Mutex::new(None),
            ended: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            clones: AtomicU64::new(0),
            ended_listeners: ListenerSet::new(),
            frame_listeners: ListenerSet::new(),
        })
    }

    fn publish(&self, frame: VideoFrame) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        *self.dimensions.lock() = Some(frame.dimensions());
        *self.latest.lock() = Some(frame);
        self.frames.fetch_add(1, Ordering::SeqCst);
        for listener in self.frame_listeners.snapshot() {
            listener();
        }
    }
}

/// A running synthetic video source.
///
/// Dropping the source ends it.
pub struct SoftVideoSource {
    inner: Arc<SourceInner>,
    producer: Mutex<Option<Ticker>>,
}

impl SoftVideoSource {
    /// Start producing `pattern` frames of `width`×`height` at `fps`.
    pub fn spawn(name: &str, width: u32, height: u32, fps: u32, pattern: Pattern) -> Result<Self, CaptureError> {
        let inner = SourceInner::new(name);

        // First frame is available immediately so dimensions are known.
        inner.publish(pattern.render(width, height, 0, fps));

        let producer_inner = Arc::clone(&inner);
        let mut index = 0u64;
        let producer = Ticker::spawn(
            &format!("soft-video-{}", name),
            Ticker::interval_for_fps(fps),
            move || {
                index += 1;
                producer_inner.publish(pattern.render(width, height, index, fps));
            },
        )?;
        log::debug!("video source {} started: {}x{} @ {} fps", name, width, height, fps);

        Ok(Self {
            inner,
            producer: Mutex::new(Some(producer)),
        })
    }

    /// A source that never produces a frame, so its dimensions stay unknown.
    pub fn unready(name: &str) -> Self {
        Self {
            inner: SourceInner::new(name),
            producer: Mutex::new(None),
        }
    }

    /// The registry-owned handle for this source.
    pub fn track(&self) -> Arc<dyn VideoTrack> {
        Arc::new(SoftVideoTrack {
            id: self.inner.name.clone(),
            source: Arc::clone(&self.inner),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// End the source as its owner would (e.g. the user stops sharing).
    ///
    /// Every handle observes the end exactly once; later calls are ignored.
    pub fn end(&self) {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let producer = self.producer.lock().take();
        if let Some(mut producer) = producer {
            producer.stop();
        }
        *self.inner.latest.lock() = None;
        self.inner.frame_listeners.clear();

        log::info!("video source {} ended", self.inner.name);
        for listener in self.inner.ended_listeners.snapshot() {
            listener();
        }
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    pub fn frames_produced(&self) -> u64 {
        self.inner.frames.load(Ordering::SeqCst)
    }

    /// Handles still listening for termination.
    pub fn ended_listener_count(&self) -> usize {
        self.inner.ended_listeners.len()
    }
}

impl Drop for SoftVideoSource {
    fn drop(&mut self) {
        self.end();
    }
}

/// A handle onto a [`SoftVideoSource`]. Stopping a handle silences only it.
pub struct SoftVideoTrack {
    id: String,
    source: Arc<SourceInner>,
    stopped: Arc<AtomicBool>,
}

impl SoftVideoTrack {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl VideoTrack for SoftVideoTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_live(&self) -> bool {
        !self.source.ended.load(Ordering::SeqCst) && !self.is_stopped()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        *self.source.dimensions.lock()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.is_live() {
            return None;
        }
        self.source.latest.lock().clone()
    }

    fn on_ended(&self, listener: EndedListener) -> Subscription {
        let stopped = Arc::clone(&self.stopped);
        self.source.ended_listeners.add(Arc::new(move || {
            if !stopped.load(Ordering::SeqCst) {
                listener();
            }
        }))
    }

    fn on_frame(&self, listener: FrameListener) -> Option<Subscription> {
        let stopped = Arc::clone(&self.stopped);
        Some(self.source.frame_listeners.add(Arc::new(move || {
            if !stopped.load(Ordering::SeqCst) {
                listener();
            }
        })))
    }

    fn clone_track(&self) -> Arc<dyn VideoTrack> {
        let n = self.source.clones.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(SoftVideoTrack {
            id: format!("{}#{}", self.source.name, n),
            source: Arc::clone(&self.source),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
