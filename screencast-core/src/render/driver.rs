use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::canvas_track::{CanvasTrack, CaptureMode};
use super::ticker::Ticker;
use crate::compositing::compositor::{CompositorInput, FrameCompositor};
use crate::compositing::geometry;
use crate::compositing::resize::ResizeDebouncer;
use crate::models::config::{Anchor, CompositionConfig, Layout, RecorderConfiguration, Visibility};
use crate::models::error::CaptureError;
use crate::models::source::SourceKind;
use crate::traits::subscription::Subscription;
use crate::traits::video_track::VideoTrack;

/// Lowest rate of the background ticker.
pub const MIN_BACKGROUND_FPS: u32 = 15;

const READINESS_POLL: Duration = Duration::from_millis(10);

/// How frames reach the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStrategy {
    /// A single video source is forwarded untouched. A lone camera is not
    /// mirrored.
    Passthrough,
    /// Composite on the source's frame callback, or a ticker at the target fps.
    Foreground,
    /// Composite on a dedicated ticker and push every frame explicitly.
    Background,
}

pub fn select_strategy(video_sources: usize, visibility: Visibility) -> RenderStrategy {
    match (video_sources, visibility) {
        (1, _) => RenderStrategy::Passthrough,
        (_, Visibility::Visible) => RenderStrategy::Foreground,
        (_, Visibility::Hidden) => RenderStrategy::Background,
    }
}

pub fn background_fps(target_fps: u32) -> u32 {
    target_fps.max(MIN_BACKGROUND_FPS)
}

/// Block until every track reports its dimensions, has ended, or `timeout` passes.
///
/// Returns whether all live tracks were ready.
pub fn wait_for_dimensions(tracks: &[&Arc<dyn VideoTrack>], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let ready = tracks.iter().all(|t| !t.is_live() || t.dimensions().is_some());
        if ready {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(READINESS_POLL);
    }
}

struct Scene {
    screen: Option<Arc<dyn VideoTrack>>,
    camera: Option<Arc<dyn VideoTrack>>,
    compositor: FrameCompositor,
    debouncer: ResizeDebouncer,
}

impl Scene {
    fn live(track: &Option<Arc<dyn VideoTrack>>) -> Option<&Arc<dyn VideoTrack>> {
        track.as_ref().filter(|t| t.is_live())
    }

    fn primary(&self) -> Option<Arc<dyn VideoTrack>> {
        Self::live(&self.screen).or(Self::live(&self.camera)).cloned()
    }

    fn has_video(&self) -> bool {
        Self::live(&self.screen).is_some() || Self::live(&self.camera).is_some()
    }

    /// Feed the debouncer and apply a settled canvas size.
    fn track_canvas_size(&mut self, canvas: &CanvasTrack, now: Instant) {
        let desired = geometry::desired_canvas(
            Self::live(&self.screen).and_then(|t| t.dimensions()),
            Self::live(&self.camera).and_then(|t| t.dimensions()),
            self.debouncer.current(),
        );
        if let Some(size) = desired {
            self.debouncer.observe(size, now);
        }
        if let Some((width, height)) = self.debouncer.poll(now) {
            let resized = self.compositor.config().resized(width, height);
            match self.compositor.reconfigure(resized) {
                Ok(()) => {
                    log::info!("canvas resized to {}x{}", resized.canvas_width, resized.canvas_height);
                    canvas.set_dimensions(resized.canvas_width, resized.canvas_height);
                }
                Err(e) => log::warn!("keeping current canvas: {}", e),
            }
        }
    }
}

/// Compositing surface shared with whichever thread drives the ticks.
struct Surface {
    scene: Mutex<Scene>,
    canvas: CanvasTrack,
    stopped: AtomicBool,
}

impl Surface {
    /// Composite the newest frame of every live source onto the canvas.
    fn render_tick(&self) -> bool {
        let mut scene = self.scene.lock();
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        scene.track_canvas_size(&self.canvas, Instant::now());

        let screen = Scene::live(&scene.screen).and_then(|t| t.latest_frame());
        let camera = Scene::live(&scene.camera).and_then(|t| t.latest_frame());
        let frame = scene.compositor.composite(CompositorInput {
            screen: screen.as_ref(),
            camera: camera.as_ref(),
        });

        // published under the scene lock so freeze() waits out an in-flight tick
        self.canvas.publish(frame);
        true
    }
}

enum ForegroundLoop {
    SourceCallback(Subscription),
    Ticker(Ticker),
}

impl ForegroundLoop {
    fn stop(self) {
        match self {
            Self::SourceCallback(subscription) => subscription.unsubscribe(),
            Self::Ticker(mut ticker) => ticker.stop(),
        }
    }
}

struct CompositingLoop {
    surface: Arc<Surface>,
    fps: u32,
    foreground: Option<ForegroundLoop>,
    background: Option<Ticker>,
}

impl CompositingLoop {
    fn start_foreground(&mut self) -> Result<(), CaptureError> {
        self.canvas().set_capture_mode(CaptureMode::Automatic);

        let primary = self.surface.scene.lock().primary();
        let weak = Arc::downgrade(&self.surface);
        let callback = primary.and_then(|track| {
            let weak = Weak::clone(&weak);
            track.on_frame(Arc::new(move || {
                if let Some(surface) = weak.upgrade() {
                    surface.render_tick();
                }
            }))
        });

        self.foreground = Some(match callback {
            Some(subscription) => {
                log::debug!("foreground compositing on source frame callback");
                ForegroundLoop::SourceCallback(subscription)
            }
            None => {
                log::debug!("foreground compositing at {} fps", self.fps);
                ForegroundLoop::Ticker(Ticker::spawn("render-foreground", Ticker::interval_for_fps(self.fps), move || {
                    if let Some(surface) = weak.upgrade() {
                        surface.render_tick();
                    }
                })?)
            }
        });
        Ok(())
    }

    fn start_background(&mut self) -> Result<(), CaptureError> {
        self.canvas().set_capture_mode(CaptureMode::Manual);

        let fps = background_fps(self.fps);
        let weak = Arc::downgrade(&self.surface);
        self.background = Some(Ticker::spawn(
            "render-background",
            Ticker::interval_for_fps(fps),
            move || {
                if let Some(surface) = weak.upgrade() {
                    if surface.render_tick() {
                        surface.canvas.request_frame();
                    }
                }
            },
        )?);
        log::debug!("background compositing at {} fps", fps);
        Ok(())
    }

    fn halt_loops(&mut self) {
        if let Some(foreground) = self.foreground.take() {
            foreground.stop();
        }
        if let Some(mut ticker) = self.background.take() {
            ticker.stop();
        }
    }

    fn canvas(&self) -> &CanvasTrack {
        &self.surface.canvas
    }
}

enum DriverKind {
    Passthrough {
        kind: SourceKind,
        track: Arc<dyn VideoTrack>,
    },
    Compositing(CompositingLoop),
}

/// Feeds video to the encoder using the strategy that fits the sources and
/// the host surface's visibility.
pub struct RenderDriver {
    kind: DriverKind,
    visibility: Visibility,
    fallback_canvas: (u32, u32),
    stopped: bool,
}

impl RenderDriver {
    /// Start rendering the given (already cloned) tracks.
    ///
    /// With two sources this waits for their dimensions, bounded by the
    /// readiness timeout, before sizing the canvas. Without any video the
    /// canvas stays black at the fallback size.
    pub fn start(
        screen: Option<Arc<dyn VideoTrack>>,
        camera: Option<Arc<dyn VideoTrack>>,
        config: &RecorderConfiguration,
        visibility: Visibility,
    ) -> Result<Self, CaptureError> {
        let count = screen.is_some() as usize + camera.is_some() as usize;
        let strategy = select_strategy(count, visibility);

        let kind = match (screen, camera) {
            (Some(track), None) if strategy == RenderStrategy::Passthrough => DriverKind::Passthrough {
                kind: SourceKind::Screen,
                track,
            },
            (None, Some(track)) if strategy == RenderStrategy::Passthrough => DriverKind::Passthrough {
                kind: SourceKind::Camera,
                track,
            },
            (screen, camera) => DriverKind::Compositing(Self::build_compositing(screen, camera, config, visibility)?),
        };

        log::info!("render driver started: {:?}", strategy);
        Ok(Self {
            kind,
            visibility,
            fallback_canvas: config.fallback_canvas,
            stopped: false,
        })
    }

    fn build_compositing(
        screen: Option<Arc<dyn VideoTrack>>,
        camera: Option<Arc<dyn VideoTrack>>,
        config: &RecorderConfiguration,
        visibility: Visibility,
    ) -> Result<CompositingLoop, CaptureError> {
        let participants: Vec<&Arc<dyn VideoTrack>> = screen.iter().chain(camera.iter()).collect();
        if !wait_for_dimensions(&participants, config.readiness_timeout) {
            log::warn!(
                "sources not ready after {:?}; compositing with what is available",
                config.readiness_timeout
            );
        }

        let (width, height) = geometry::desired_canvas(
            screen.as_ref().and_then(|t| t.dimensions()),
            camera.as_ref().and_then(|t| t.dimensions()),
            None,
        )
        .unwrap_or(config.fallback_canvas);
        let composition = config.composition(width, height);
        let size = (composition.canvas_width, composition.canvas_height);

        let surface = Arc::new(Surface {
            scene: Mutex::new(Scene {
                screen,
                camera,
                compositor: FrameCompositor::new(composition)?,
                debouncer: ResizeDebouncer::with_current(config.resize_debounce, size),
            }),
            canvas: CanvasTrack::new(size.0, size.1),
            stopped: AtomicBool::new(false),
        });

        let mut compositing = CompositingLoop {
            surface,
            fps: config.target_fps,
            foreground: None,
            background: None,
        };
        match visibility {
            Visibility::Visible => compositing.start_foreground()?,
            Visibility::Hidden => compositing.start_background()?,
        }
        Ok(compositing)
    }

    pub fn strategy(&self) -> RenderStrategy {
        match &self.kind {
            DriverKind::Passthrough { .. } => RenderStrategy::Passthrough,
            DriverKind::Compositing(c) if c.background.is_some() => RenderStrategy::Background,
            DriverKind::Compositing(_) => RenderStrategy::Foreground,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Track to hand to the encoder.
    pub fn output(&self) -> Arc<dyn VideoTrack> {
        match &self.kind {
            DriverKind::Passthrough { track, .. } => Arc::clone(track),
            DriverKind::Compositing(c) => Arc::new(c.canvas().clone()),
        }
    }

    /// Swap between the foreground and background paths.
    pub fn set_visibility(&mut self, visibility: Visibility) -> Result<(), CaptureError> {
        if visibility == self.visibility {
            return Ok(());
        }
        self.visibility = visibility;
        if self.stopped {
            return Ok(());
        }

        if let DriverKind::Compositing(compositing) = &mut self.kind {
            compositing.halt_loops();
            match visibility {
                Visibility::Visible => compositing.start_foreground()?,
                Visibility::Hidden => compositing.start_background()?,
            }
            log::info!("render strategy switched to {:?}", self.strategy());
        }
        Ok(())
    }

    /// Apply a new overlay selection from the next tick on.
    pub fn set_layout(&mut self, layout: Layout, anchor: Anchor) -> Result<(), CaptureError> {
        if let DriverKind::Compositing(compositing) = &self.kind {
            let mut scene = compositing.surface.scene.lock();
            let updated = scene.compositor.config().with_layout(layout, anchor);
            scene.compositor.reconfigure(updated)?;
        }
        Ok(())
    }

    /// Remove an ended source. Returns whether any video remains.
    ///
    /// Losing the screen while the camera is live keeps compositing with the
    /// camera alone; the canvas keeps its size.
    pub fn drop_source(&mut self, kind: SourceKind) -> Result<bool, CaptureError> {
        match &mut self.kind {
            DriverKind::Passthrough { kind: forwarded, track } => Ok(*forwarded != kind && track.is_live()),
            DriverKind::Compositing(compositing) => {
                let remaining = {
                    let mut scene = compositing.surface.scene.lock();
                    match kind {
                        SourceKind::Screen => scene.screen = None,
                        SourceKind::Camera => scene.camera = None,
                        SourceKind::Mic => {}
                    }
                    scene.has_video()
                };

                if remaining && !self.stopped && kind != SourceKind::Mic {
                    if let Some(foreground) = compositing.foreground.take() {
                        foreground.stop();
                        compositing.start_foreground()?;
                    }
                    log::info!("{:?} ended; continuing with remaining source", kind);
                }
                Ok(remaining)
            }
        }
    }

    /// Canvas geometry currently in effect.
    pub fn composition(&self, config: &RecorderConfiguration) -> CompositionConfig {
        match &self.kind {
            DriverKind::Passthrough { track, .. } => {
                let (w, h) = track.dimensions().unwrap_or(self.fallback_canvas);
                config.composition(w, h)
            }
            DriverKind::Compositing(c) => *c.surface.scene.lock().compositor.config(),
        }
    }

    pub fn compositor_frames(&self) -> u64 {
        match &self.kind {
            DriverKind::Passthrough { .. } => 0,
            DriverKind::Compositing(c) => c.surface.scene.lock().compositor.frames_produced(),
        }
    }

    pub fn frame_pushes(&self) -> u64 {
        match &self.kind {
            DriverKind::Passthrough { .. } => 0,
            DriverKind::Compositing(c) => c.canvas().frame_pushes(),
        }
    }

    /// Stop publishing composited frames without ending the canvas track.
    ///
    /// Returns once no tick is mid-publish, so the canvas holds the last
    /// complete frame while sources are torn down.
    pub fn freeze(&self) {
        if let DriverKind::Compositing(compositing) = &self.kind {
            compositing.surface.stopped.store(true, Ordering::SeqCst);
            drop(compositing.surface.scene.lock());
        }
    }

    /// Halt compositing and end the canvas track. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let DriverKind::Compositing(compositing) = &mut self.kind {
            compositing.surface.stopped.store(true, Ordering::SeqCst);
            compositing.halt_loops();
            compositing.canvas().end();
        }
        log::debug!("render driver stopped");
    }
}

impl Drop for RenderDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
