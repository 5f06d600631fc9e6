use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::lifecycle::ResourceLifecycle;
use super::recording::RecordingSession;
use super::state_machine::{EnterListener, SessionStateMachine};
use crate::encoder::driver::EncoderDriver;
use crate::models::config::{Anchor, Layout, RecorderConfiguration, Visibility};
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecorderDiagnostics, RecordingMetadata, RecordingResult};
use crate::models::source::{CaptureSource, SourceKind};
use crate::models::state::SessionState;
use crate::processing::audio_graph::{self, AudioMix};
use crate::render::driver::{RenderDriver, RenderStrategy};
use crate::render::ticker::Ticker;
use crate::traits::audio_track::AudioTrack;
use crate::traits::encoder_backend::{EncoderBackend, EncoderInput};
use crate::traits::recorder_delegate::RecorderDelegate;
use crate::traits::subscription::Subscription;
use crate::traits::video_track::VideoTrack;

/// Delegate notifications collected under the lock and delivered after it.
enum Event {
    State(SessionState),
    Error(CaptureError),
    Finished(RecordingResult),
}

/// Resources owned by the current (or most recent) recording.
struct Active<E: EncoderBackend> {
    encoder: EncoderDriver<E>,
    render: Option<RenderDriver>,
    audio: AudioMix,
    audio_tracks: Vec<Arc<dyn AudioTrack>>,
    has_video: bool,
    visibility: Visibility,
    timer: Option<Ticker>,
}

struct Shared<E: EncoderBackend> {
    config: Mutex<RecorderConfiguration>,
    machine: SessionStateMachine,
    lifecycle: ResourceLifecycle,
    session: Mutex<Option<RecordingSession>>,
    delegate: Mutex<Option<Arc<dyn RecorderDelegate>>>,
    active: Mutex<Active<E>>,
}

/// Screen + camera recorder.
///
/// Owns one encoder backend and runs at most one recording at a time:
/// ```text
/// [screen] ─┐                                  ┌→ video ─┐
/// [camera] ─┴→ RenderDriver (passthrough or   ─┘         ├→ EncoderDriver → artifact
///              compositor on canvas)                     │
/// [audio…] ──→ AudioMix (graph or passthrough) ─→ audio ─┘
/// ```
///
/// All methods take `&self`; the recorder can be shared across threads.
/// Delegate callbacks are delivered without internal locks held, so a
/// delegate may call back into the recorder.
pub struct ScreenRecorder<E: EncoderBackend + 'static> {
    shared: Arc<Shared<E>>,
}

impl<E: EncoderBackend + 'static> ScreenRecorder<E> {
    pub fn new(backend: E, config: RecorderConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let stop_grace = config.stop_grace;

        Ok(Self {
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                machine: SessionStateMachine::new(),
                lifecycle: ResourceLifecycle::new(),
                session: Mutex::new(None),
                delegate: Mutex::new(None),
                active: Mutex::new(Active {
                    encoder: EncoderDriver::new(backend, stop_grace),
                    render: None,
                    audio: AudioMix::Silent,
                    audio_tracks: Vec::new(),
                    has_video: false,
                    visibility: Visibility::Visible,
                    timer: None,
                }),
            }),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn RecorderDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.shared.machine.state()
    }

    /// Recording time so far, paused spans excluded.
    pub fn elapsed(&self) -> Duration {
        self.shared.elapsed()
    }

    pub fn configuration(&self) -> RecorderConfiguration {
        self.shared.config.lock().clone()
    }

    /// The current or most recent recording session.
    pub fn session(&self) -> Option<RecordingSession> {
        self.shared.session.lock().clone()
    }

    /// Register for entries into `state`. Listeners run with the recorder
    /// locked and must not call back into it.
    pub fn on_state_enter(&self, state: SessionState, listener: EnterListener) -> Subscription {
        self.shared.machine.on_enter(state, listener)
    }

    /// Begin recording the given sources.
    ///
    /// A terminal previous session is consumed first. Rejected with
    /// `InvalidTransition` while another start is in flight or a recording
    /// is active.
    pub fn start(&self, sources: &[CaptureSource]) -> Result<(), CaptureError> {
        let _guard = self.shared.machine.try_begin_start()?;
        let config = self.configuration();

        let mut events = Vec::new();
        let result = {
            let mut guard = self.shared.active.lock();
            self.shared.start_locked(&mut guard, sources, &config, &mut events)
        };
        self.shared.dispatch(events);
        result
    }

    /// Freeze elapsed time and the encoder. A no-op unless recording.
    pub fn pause(&self) -> Result<(), CaptureError> {
        let mut events = Vec::new();
        let result = {
            let mut active = self.shared.active.lock();
            if self.shared.machine.state() != SessionState::Recording {
                return Ok(());
            }
            self.shared.transition(SessionState::Paused, &mut events).map(|()| {
                active.encoder.pause();
                if let Some(session) = self.shared.session.lock().as_mut() {
                    session.clock.pause(Instant::now());
                }
            })
        };
        self.shared.dispatch(events);
        result
    }

    /// Undo [`pause`](Self::pause). A no-op unless paused.
    pub fn resume(&self) -> Result<(), CaptureError> {
        let mut events = Vec::new();
        let result = {
            let mut active = self.shared.active.lock();
            if self.shared.machine.state() != SessionState::Paused {
                return Ok(());
            }
            self.shared.transition(SessionState::Recording, &mut events).map(|()| {
                active.encoder.resume();
                if let Some(session) = self.shared.session.lock().as_mut() {
                    session.clock.resume(Instant::now());
                }
            })
        };
        self.shared.dispatch(events);
        result
    }

    /// Finish the recording and return its result.
    ///
    /// Returns `Ok(None)` when nothing is being recorded, including while a
    /// stop is already in progress.
    pub fn stop(&self) -> Result<Option<RecordingResult>, CaptureError> {
        let mut events = Vec::new();
        let result = {
            let mut guard = self.shared.active.lock();
            if !self.shared.machine.state().is_capturing() {
                return Ok(None);
            }
            self.shared.finish(&mut guard, &mut events).map(Some)
        };
        self.shared.dispatch(events);
        result
    }

    /// Consume a `Completed` or `Error` session and return to `Idle`.
    pub fn reset(&self) -> Result<(), CaptureError> {
        let mut events = Vec::new();
        let result = {
            let _active = self.shared.active.lock();
            match self.shared.machine.state() {
                SessionState::Idle => Ok(()),
                state if state.is_terminal() => self.shared.transition(SessionState::Idle, &mut events),
                state => Err(CaptureError::InvalidTransition {
                    from: state,
                    to: SessionState::Idle,
                }),
            }
        };
        self.shared.dispatch(events);
        result
    }

    /// Report whether the host surface is visible. While hidden, compositing
    /// moves to the background-safe ticker.
    pub fn set_visibility(&self, visibility: Visibility) -> Result<(), CaptureError> {
        let mut guard = self.shared.active.lock();
        let active = &mut *guard;
        active.visibility = visibility;
        match active.render.as_mut() {
            Some(render) => render.set_visibility(visibility),
            None => Ok(()),
        }
    }

    /// Change the overlay selection, live if recording.
    pub fn set_layout(&self, layout: Layout, anchor: Anchor) -> Result<(), CaptureError> {
        {
            let mut config = self.shared.config.lock();
            config.layout = layout;
            config.anchor = anchor;
        }
        match self.shared.active.lock().render.as_mut() {
            Some(render) => render.set_layout(layout, anchor),
            None => Ok(()),
        }
    }

    pub fn render_strategy(&self) -> Option<RenderStrategy> {
        self.shared.active.lock().render.as_ref().map(|r| r.strategy())
    }

    pub fn diagnostics(&self) -> RecorderDiagnostics {
        let active = self.shared.active.lock();
        let (frames_composited, frame_pushes) = active
            .render
            .as_ref()
            .map(|r| (r.compositor_frames(), r.frame_pushes()))
            .unwrap_or_default();

        RecorderDiagnostics {
            frames_composited,
            frame_pushes,
            audio_mix_cycles: active.audio.mix_cycles(),
            chunks_received: active.encoder.chunk_count() as u64,
            bytes_received: active.encoder.bytes_received(),
        }
    }
}

impl<E: EncoderBackend + 'static> Drop for ScreenRecorder<E> {
    fn drop(&mut self) {
        let mut active = self.shared.active.lock();
        self.shared.teardown(&mut active);
    }
}

impl<E: EncoderBackend + 'static> Shared<E> {
    fn elapsed(&self) -> Duration {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.clock.elapsed(Instant::now()))
            .unwrap_or_default()
    }

    fn dispatch(&self, events: Vec<Event>) {
        let Some(delegate) = self.delegate.lock().clone() else {
            return;
        };
        for event in events {
            match event {
                Event::State(state) => delegate.on_state_changed(state),
                Event::Error(error) => delegate.on_error(&error),
                Event::Finished(result) => delegate.on_recording_finished(&result),
            }
        }
    }

    fn transition(&self, to: SessionState, events: &mut Vec<Event>) -> Result<(), CaptureError> {
        self.machine.transition(to)?;
        log::info!("recorder state: {}", to);
        events.push(Event::State(to));
        Ok(())
    }

    fn start_locked(
        self: &Arc<Self>,
        active: &mut Active<E>,
        sources: &[CaptureSource],
        config: &RecorderConfiguration,
        events: &mut Vec<Event>,
    ) -> Result<(), CaptureError> {
        if self.machine.state().is_terminal() {
            self.transition(SessionState::Idle, events)?;
        }
        self.transition(SessionState::Preparing, events)?;
        *self.session.lock() = Some(RecordingSession::new());

        match self.prepare(active, sources, config, events) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.fail(active, error.clone(), events);
                Err(error)
            }
        }
    }

    fn prepare(
        self: &Arc<Self>,
        active: &mut Active<E>,
        sources: &[CaptureSource],
        config: &RecorderConfiguration,
        events: &mut Vec<Event>,
    ) -> Result<(), CaptureError> {
        let profile = active.encoder.negotiate(&config.codec_preferences)?;

        let video_of = |kind: SourceKind| {
            sources
                .iter()
                .filter(|s| s.kind == kind)
                .find_map(|s| s.live_video())
        };
        let screen = video_of(SourceKind::Screen);
        let camera = video_of(SourceKind::Camera);
        let audio: Vec<(SourceKind, &Arc<dyn AudioTrack>)> = sources
            .iter()
            .filter_map(|s| s.live_audio().map(|t| (s.kind, t)))
            .collect();
        if screen.is_none() && camera.is_none() && audio.is_empty() {
            return Err(CaptureError::StreamInactive);
        }

        let screen = screen.map(|t| self.adopt_video(t, SourceKind::Screen));
        let camera = camera.map(|t| self.adopt_video(t, SourceKind::Camera));
        let audio_tracks: Vec<Arc<dyn AudioTrack>> =
            audio.into_iter().map(|(kind, t)| self.adopt_audio(t, kind)).collect();
        log::info!(
            "recording sources: screen={} camera={} audio={}",
            screen.is_some(),
            camera.is_some(),
            audio_tracks.len()
        );

        active.has_video = screen.is_some() || camera.is_some();
        active.audio = audio_graph::mix(&audio_tracks, &config.audio);
        active.audio_tracks = audio_tracks;

        let render = RenderDriver::start(screen, camera, config, active.visibility)?;
        let input = EncoderInput {
            video: render.output(),
            audio: active.audio.track(),
            frame_rate: config.target_fps,
        };
        active.render = Some(render);
        let has_audio = input.audio.is_some();
        active.encoder.start(profile, input)?;

        active.timer = Some(self.spawn_elapsed_timer(config.elapsed_tick_interval)?);
        if let Some(session) = self.session.lock().as_mut() {
            session.has_audio = has_audio;
            session.clock.start(Instant::now());
        }
        self.transition(SessionState::Recording, events)
    }

    /// Clone a source video track and watch it for termination.
    fn adopt_video(self: &Arc<Self>, track: &Arc<dyn VideoTrack>, kind: SourceKind) -> Arc<dyn VideoTrack> {
        let clone = track.clone_track();
        let stopper = Arc::clone(&clone);
        self.lifecycle
            .register(format!("stop {:?} video clone", kind), move || stopper.stop());

        let weak = Arc::downgrade(self);
        let ended = clone.on_ended(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.handle_video_ended(kind);
            }
        }));
        self.lifecycle
            .register(format!("{:?} video ended listener", kind), ended.into_disposer());
        clone
    }

    fn adopt_audio(self: &Arc<Self>, track: &Arc<dyn AudioTrack>, kind: SourceKind) -> Arc<dyn AudioTrack> {
        let clone = track.clone_track();
        let stopper = Arc::clone(&clone);
        self.lifecycle
            .register(format!("stop {:?} audio clone", kind), move || stopper.stop());

        let weak = Arc::downgrade(self);
        let ended = clone.on_ended(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.handle_audio_ended(kind);
            }
        }));
        self.lifecycle
            .register(format!("{:?} audio ended listener", kind), ended.into_disposer());
        clone
    }

    fn spawn_elapsed_timer(self: &Arc<Self>, interval: Duration) -> Result<Ticker, CaptureError> {
        let weak = Arc::downgrade(self);
        Ticker::spawn("elapsed-timer", interval, move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if shared.machine.state() != SessionState::Recording {
                return;
            }
            let elapsed = shared.elapsed();
            let delegate = shared.delegate.lock().clone();
            if let Some(delegate) = delegate {
                delegate.on_elapsed(elapsed);
            }
        })
    }

    fn handle_video_ended(&self, kind: SourceKind) {
        let mut events = Vec::new();
        {
            let mut guard = self.active.lock();
            let active = &mut *guard;
            if !self.machine.state().is_capturing() {
                return;
            }
            let Some(render) = active.render.as_mut() else {
                return;
            };
            match render.drop_source(kind) {
                Ok(true) => log::info!("{:?} ended; recording continues", kind),
                Ok(false) => {
                    log::info!("{:?} ended with no video left; finishing", kind);
                    if let Err(e) = self.finish(active, &mut events) {
                        log::debug!("auto-finish failed and was reported: {}", e);
                    }
                }
                Err(error) => self.fail(active, error, &mut events),
            }
        }
        self.dispatch(events);
    }

    fn handle_audio_ended(&self, kind: SourceKind) {
        let mut events = Vec::new();
        {
            let mut guard = self.active.lock();
            let active = &mut *guard;
            if !self.machine.state().is_capturing() || active.has_video {
                return;
            }
            if active.audio_tracks.iter().any(|t| t.is_live()) {
                return;
            }
            log::info!("{:?} audio ended with no source left; finishing", kind);
            if let Err(e) = self.finish(active, &mut events) {
                log::debug!("auto-finish failed and was reported: {}", e);
            }
        }
        self.dispatch(events);
    }

    /// Stop protocol. The caller has checked the session is capturing.
    fn finish(&self, active: &mut Active<E>, events: &mut Vec<Event>) -> Result<RecordingResult, CaptureError> {
        self.transition(SessionState::Stopping, events)?;
        if let Some(timer) = active.timer.take() {
            timer.detach();
        }

        let (session_id, duration, has_audio) = {
            let mut session = self.session.lock();
            let session = session.get_or_insert_with(RecordingSession::new);
            let now = Instant::now();
            session.clock.stop(now);
            (session.id.clone(), session.clock.elapsed(now), session.has_audio)
        };

        let config = self.config.lock().clone();
        let composition = match active.render.as_ref() {
            Some(render) => render.composition(&config),
            None => config.composition(config.fallback_canvas.0, config.fallback_canvas.1),
        };

        let lifecycle = &self.lifecycle;
        let render = &mut active.render;
        let audio = &mut active.audio;
        let stopped = active.encoder.stop(|| {
            if let Some(render) = render.as_ref() {
                render.freeze();
            }
            lifecycle.cleanup();
            audio.stop();
            if let Some(render) = render.as_mut() {
                render.stop();
            }
        });

        let artifact = match stopped {
            Ok(artifact) => artifact,
            Err(error) => {
                self.fail(active, error.clone(), events);
                return Err(error);
            }
        };

        let profile = active
            .encoder
            .profile()
            .map(|p| p.to_string())
            .unwrap_or_default();
        let mut metadata = RecordingMetadata::describe(
            &artifact,
            &profile,
            duration,
            active.encoder.chunk_count(),
            &composition,
            has_audio,
        );
        metadata.id = session_id;

        let result = RecordingResult {
            artifact,
            duration,
            metadata,
        };
        log::info!(
            "recording finished: {} bytes, {:.2}s",
            result.artifact.len(),
            duration.as_secs_f64()
        );

        self.transition(SessionState::Completed, events)?;
        events.push(Event::Finished(result.clone()));
        Ok(result)
    }

    /// Tear down and move to `Error`.
    fn fail(&self, active: &mut Active<E>, error: CaptureError, events: &mut Vec<Event>) {
        log::error!("recording failed: {}", error);
        self.teardown(active);
        if let Some(session) = self.session.lock().as_mut() {
            session.fail(&error);
        }

        if self.machine.state().is_capturing() {
            let _ = self.transition(SessionState::Stopping, events);
        }
        if let Err(e) = self.transition(SessionState::Error, events) {
            log::warn!("could not enter error state: {}", e);
        }
        if error.is_surfaced() {
            events.push(Event::Error(error));
        }
    }

    /// Release everything the session holds. Idempotent.
    fn teardown(&self, active: &mut Active<E>) {
        if let Some(timer) = active.timer.take() {
            timer.detach();
        }
        self.lifecycle.cleanup();
        active.audio.stop();
        if let Some(render) = active.render.as_mut() {
            render.stop();
        }
        active.encoder.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::VideoFrame;
    use crate::traits::encoder_backend::ChunkCallback;
    use crate::traits::subscription::ListenerSet;
    use crate::traits::video_track::{EndedListener, FrameListener};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    type Listener = dyn Fn() + Send + Sync;

    struct Source {
        frame: VideoFrame,
        ended: AtomicBool,
        ended_listeners: ListenerSet<Listener>,
    }

    /// Video track handle; clones share the source but stop independently.
    struct FakeVideo {
        id: String,
        source: Arc<Source>,
        stopped: AtomicBool,
    }

    impl FakeVideo {
        fn new(id: &str, width: u32, height: u32) -> Arc<Self> {
            Self::colored(id, width, height, [10, 20, 30, 255])
        }

        fn colored(id: &str, width: u32, height: u32, color: [u8; 4]) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                source: Arc::new(Source {
                    frame: VideoFrame::solid(width, height, color),
                    ended: AtomicBool::new(false),
                    ended_listeners: ListenerSet::new(),
                }),
                stopped: AtomicBool::new(false),
            })
        }

        fn end(&self) {
            if !self.source.ended.swap(true, Ordering::SeqCst) {
                for listener in self.source.ended_listeners.snapshot() {
                    listener();
                }
            }
        }
    }

    impl VideoTrack for FakeVideo {
        fn id(&self) -> &str {
            &self.id
        }
        fn is_live(&self) -> bool {
            !self.source.ended.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
        }
        fn dimensions(&self) -> Option<(u32, u32)> {
            Some(self.source.frame.dimensions())
        }
        fn latest_frame(&self) -> Option<VideoFrame> {
            self.is_live().then(|| self.source.frame.clone())
        }
        fn on_ended(&self, listener: EndedListener) -> Subscription {
            self.source.ended_listeners.add(listener)
        }
        fn on_frame(&self, _: FrameListener) -> Option<Subscription> {
            None
        }
        fn clone_track(&self) -> Arc<dyn VideoTrack> {
            Arc::new(FakeVideo {
                id: format!("{}-clone", self.id),
                source: Arc::clone(&self.source),
                stopped: AtomicBool::new(false),
            })
        }
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Encoder emitting one chunk per `request_data` unless told to stay silent.
    #[derive(Default)]
    struct FakeEncoder {
        on_data: Option<ChunkCallback>,
        silent: bool,
        started_with: Arc<Mutex<Option<String>>>,
        video: Option<Arc<dyn VideoTrack>>,
        /// Frame the video input held when the encoder was stopped.
        final_frame: Arc<Mutex<Option<VideoFrame>>>,
    }

    impl EncoderBackend for FakeEncoder {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            mime_type == "video/webm;codecs=vp8,opus" || mime_type == "video/webm"
        }
        fn start(&mut self, _mime: &str, input: EncoderInput, on_data: ChunkCallback) -> Result<(), CaptureError> {
            *self.started_with.lock() = Some(input.video.id().to_string());
            self.video = Some(input.video);
            self.on_data = Some(on_data);
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn request_data(&mut self) {
            if let (Some(on_data), false) = (&self.on_data, self.silent) {
                on_data(b"chunk".to_vec());
            }
        }
        fn stop(&mut self) -> Result<(), CaptureError> {
            self.on_data = None;
            *self.final_frame.lock() = self.video.take().and_then(|v| v.latest_frame());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<SessionState>>,
        errors: Mutex<Vec<CaptureError>>,
        finished: AtomicUsize,
    }

    impl RecorderDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: SessionState) {
            self.states.lock().push(state);
        }
        fn on_elapsed(&self, _elapsed: Duration) {}
        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }
        fn on_recording_finished(&self, _result: &RecordingResult) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> RecorderConfiguration {
        RecorderConfiguration {
            readiness_timeout: Duration::from_millis(50),
            stop_grace: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn recorder(encoder: FakeEncoder) -> (ScreenRecorder<FakeEncoder>, Arc<RecordingDelegate>) {
        let recorder = ScreenRecorder::new(encoder, config()).unwrap();
        let delegate = Arc::new(RecordingDelegate::default());
        recorder.set_delegate(delegate.clone());
        (recorder, delegate)
    }

    #[test]
    fn screen_only_recording_completes() {
        let (recorder, delegate) = recorder(FakeEncoder::default());
        let screen = FakeVideo::new("screen", 64, 36);
        recorder.start(&[CaptureSource::screen(screen.clone(), None)]).unwrap();

        assert_eq!(recorder.state(), SessionState::Recording);
        assert_eq!(recorder.render_strategy(), Some(RenderStrategy::Passthrough));

        let result = recorder.stop().unwrap().unwrap();
        assert_eq!(result.artifact.bytes, b"chunk");
        assert_eq!(result.artifact.mime_type, "video/webm");
        assert_eq!(result.metadata.codec_profile, "video/webm;codecs=vp8,opus");
        assert_eq!(recorder.state(), SessionState::Completed);
        assert_eq!(recorder.diagnostics().frames_composited, 0);
        assert!(screen.is_live(), "registry-owned track must not be stopped");

        assert_eq!(
            *delegate.states.lock(),
            vec![
                SessionState::Preparing,
                SessionState::Recording,
                SessionState::Stopping,
                SessionState::Completed
            ]
        );
        assert_eq!(delegate.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_start_is_rejected_without_state_change() {
        let (recorder, delegate) = recorder(FakeEncoder::default());
        let screen = FakeVideo::new("screen", 64, 36);
        let sources = [CaptureSource::screen(screen, None)];
        recorder.start(&sources).unwrap();

        let err = recorder.start(&sources).unwrap_err();
        assert_eq!(
            err,
            CaptureError::InvalidTransition {
                from: SessionState::Recording,
                to: SessionState::Preparing
            }
        );
        assert_eq!(recorder.state(), SessionState::Recording);
        assert!(delegate.errors.lock().is_empty());
        recorder.stop().unwrap();
    }

    #[test]
    fn no_chunks_ends_in_empty_recording_error() {
        let (recorder, delegate) = recorder(FakeEncoder {
            silent: true,
            ..Default::default()
        });
        recorder
            .start(&[CaptureSource::screen(FakeVideo::new("screen", 64, 36), None)])
            .unwrap();

        assert_eq!(recorder.stop(), Err(CaptureError::EmptyRecording));
        assert_eq!(recorder.state(), SessionState::Error);
        assert_eq!(*delegate.errors.lock(), vec![CaptureError::EmptyRecording]);
        assert_eq!(recorder.stop(), Ok(None));

        recorder.reset().unwrap();
        assert_eq!(recorder.state(), SessionState::Idle);
    }

    #[test]
    fn unsupported_codec_fails_before_capture() {
        let recorder = ScreenRecorder::new(
            FakeEncoder::default(),
            RecorderConfiguration {
                codec_preferences: vec!["video/mp4;codecs=avc1".into()],
                ..config()
            },
        )
        .unwrap();
        let screen = FakeVideo::new("screen", 64, 36);

        let err = recorder.start(&[CaptureSource::screen(screen, None)]).unwrap_err();
        assert!(matches!(err, CaptureError::CodecNotSupported(_)));
        assert_eq!(recorder.state(), SessionState::Error);
        assert_eq!(recorder.session().unwrap().error, Some(err.kind()));
    }

    #[test]
    fn no_live_source_is_stream_inactive() {
        let (recorder, delegate) = recorder(FakeEncoder::default());
        let screen = FakeVideo::new("screen", 64, 36);
        screen.end();

        let err = recorder.start(&[CaptureSource::screen(screen, None)]).unwrap_err();
        assert_eq!(err, CaptureError::StreamInactive);
        assert_eq!(*delegate.errors.lock(), vec![CaptureError::StreamInactive]);

        let screen = FakeVideo::new("screen", 64, 36);
        recorder.start(&[CaptureSource::screen(screen, None)]).unwrap();
        assert_eq!(recorder.state(), SessionState::Recording);
        recorder.stop().unwrap();
    }

    #[test]
    fn pause_and_resume_are_noops_outside_capture() {
        let (recorder, delegate) = recorder(FakeEncoder::default());
        recorder.pause().unwrap();
        recorder.resume().unwrap();
        assert_eq!(recorder.state(), SessionState::Idle);
        assert!(delegate.states.lock().is_empty());

        recorder
            .start(&[CaptureSource::screen(FakeVideo::new("screen", 64, 36), None)])
            .unwrap();
        recorder.resume().unwrap();
        recorder.pause().unwrap();
        recorder.pause().unwrap();
        assert_eq!(recorder.state(), SessionState::Paused);
        recorder.resume().unwrap();
        assert_eq!(recorder.state(), SessionState::Recording);
        recorder.stop().unwrap();
    }

    #[test]
    fn screen_end_with_camera_keeps_recording() {
        let (recorder, delegate) = recorder(FakeEncoder::default());
        let screen = FakeVideo::new("screen", 64, 36);
        let camera = FakeVideo::new("camera", 32, 24);
        recorder
            .start(&[
                CaptureSource::screen(screen.clone(), None),
                CaptureSource::camera(camera.clone()),
            ])
            .unwrap();
        assert_eq!(recorder.render_strategy(), Some(RenderStrategy::Foreground));

        screen.end();
        assert_eq!(recorder.state(), SessionState::Recording);

        camera.end();
        assert_eq!(recorder.state(), SessionState::Completed);
        assert_eq!(delegate.finished.load(Ordering::SeqCst), 1);
        assert!(delegate.errors.lock().is_empty());
    }

    #[test]
    fn stop_keeps_last_full_composite() {
        const CAMERA: [u8; 4] = [200, 40, 40, 255];
        let encoder = FakeEncoder::default();
        let final_frame = Arc::clone(&encoder.final_frame);
        let (recorder, _delegate) = recorder(encoder);
        let screen = FakeVideo::new("screen", 640, 360);
        let camera = FakeVideo::colored("camera", 320, 240, CAMERA);
        recorder
            .start(&[
                CaptureSource::screen(screen.clone(), None),
                CaptureSource::camera(camera.clone()),
            ])
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while recorder.diagnostics().frames_composited < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        recorder.stop().unwrap();

        let frame = final_frame.lock().clone().unwrap();
        let (width, height) = frame.dimensions();
        let has_camera = (0..height).any(|y| (0..width).any(|x| frame.pixel(x, y) == Some(CAMERA)));
        assert!(has_camera, "camera overlay missing from the final frame");
    }

    #[test]
    fn enter_listener_sees_completion() {
        let (recorder, _delegate) = recorder(FakeEncoder::default());
        let entered = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&entered);
        let _sub = recorder.on_state_enter(
            SessionState::Completed,
            Arc::new(move |from: SessionState, to: SessionState| e.lock().push((from, to))),
        );

        recorder
            .start(&[CaptureSource::screen(FakeVideo::new("screen", 64, 36), None)])
            .unwrap();
        recorder.stop().unwrap();
        assert_eq!(*entered.lock(), vec![(SessionState::Stopping, SessionState::Completed)]);
    }

    #[test]
    fn dropping_recorder_releases_clones() {
        let (recorder, _delegate) = recorder(FakeEncoder::default());
        let screen = FakeVideo::new("screen", 64, 36);
        recorder.start(&[CaptureSource::screen(screen.clone(), None)]).unwrap();
        assert_eq!(screen.source.ended_listeners.len(), 1);

        drop(recorder);
        assert!(screen.source.ended_listeners.is_empty());
        assert!(screen.is_live());
    }
}
