//! Software encoder producing the `video/x-screencast-mjpeg` container.
//!
//! Video is sampled at the requested frame rate on a dedicated thread and
//! stored as JPEG; audio buffers are converted to 16-bit PCM on the
//! producer's thread as they arrive. Buffered records are handed out every
//! timeslice and on `request_data`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use parking_lot::Mutex;

use screencast_core::models::error::CaptureError;
use screencast_core::models::frame::VideoFrame;
use screencast_core::processing::audio_mixer::AudioMixer;
use screencast_core::render::ticker::Ticker;
use screencast_core::session::recording::SessionClock;
use screencast_core::traits::encoder_backend::{ChunkCallback, EncoderBackend, EncoderInput};
use screencast_core::traits::subscription::Subscription;
use screencast_core::traits::video_track::VideoTrack;

use crate::container::{RecordWriter, CODECS_MIME_TYPE, MIME_TYPE};

/// Counters readable while the encoder is owned by a recorder.
#[derive(Debug, Default)]
pub struct EncoderStats {
    frames: AtomicU64,
    audio_buffers: AtomicU64,
    chunks: AtomicU64,
}

impl EncoderStats {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn audio_buffers(&self) -> u64 {
        self.audio_buffers.load(Ordering::SeqCst)
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::SeqCst)
    }
}

struct Pipeline {
    video: Arc<dyn VideoTrack>,
    writer: Mutex<RecordWriter>,
    clock: Mutex<SessionClock>,
    paused: AtomicBool,
    dirty: AtomicBool,
    event_driven: AtomicBool,
    last_flush: Mutex<Instant>,
    timeslice: Duration,
    quality: u8,
    on_data: ChunkCallback,
    stats: Arc<EncoderStats>,
}

impl Pipeline {
    fn timestamp(&self) -> Duration {
        self.clock.lock().elapsed(Instant::now())
    }

    fn sample_video(&self) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        if self.event_driven.load(Ordering::SeqCst) && !self.dirty.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(frame) = self.video.latest_frame() else {
            return;
        };
        match encode_jpeg(&frame, self.quality) {
            Ok(jpeg) => {
                let timestamp = self.timestamp();
                self.writer.lock().push_video(timestamp, &jpeg);
                self.stats.frames.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => log::warn!("dropping frame: {}", e),
        }
    }

    fn push_audio(&self, samples: &[f32], sample_rate: f64, channels: u16) {
        if self.paused.load(Ordering::SeqCst) || samples.is_empty() {
            return;
        }
        let pcm = AudioMixer::convert_to_int16_pcm(samples);
        let timestamp = self.timestamp();
        self.writer
            .lock()
            .push_audio(timestamp, sample_rate.round() as u32, channels, &pcm);
        self.stats.audio_buffers.fetch_add(1, Ordering::SeqCst);
    }

    /// Deliver pending records. The writer stays locked during delivery so
    /// chunks arrive in write order.
    fn flush(&self) {
        let mut writer = self.writer.lock();
        *self.last_flush.lock() = Instant::now();
        if !writer.has_pending() {
            return;
        }
        let chunk = writer.flush();
        self.stats.chunks.fetch_add(1, Ordering::SeqCst);
        (self.on_data)(chunk);
    }

    fn flush_if_due(&self) {
        let due = self.last_flush.lock().elapsed() >= self.timeslice;
        if due {
            self.flush();
        }
    }
}

struct Running {
    pipeline: Arc<Pipeline>,
    sampler: Ticker,
    subscriptions: Vec<Subscription>,
}

/// [`EncoderBackend`] writing JPEG frames and PCM audio into one stream.
pub struct SoftEncoder {
    quality: u8,
    timeslice: Duration,
    stats: Arc<EncoderStats>,
    running: Option<Running>,
}

impl SoftEncoder {
    pub fn new() -> Self {
        Self {
            quality: 80,
            timeslice: Duration::from_secs(1),
            stats: Arc::new(EncoderStats::default()),
            running: None,
        }
    }

    /// Interval between automatic chunk deliveries.
    pub fn with_timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice = timeslice;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Codec preference list matching what this encoder supports.
    pub fn codec_preferences() -> Vec<String> {
        vec![CODECS_MIME_TYPE.to_string(), MIME_TYPE.to_string()]
    }

    pub fn stats(&self) -> Arc<EncoderStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for SoftEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBackend for SoftEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == MIME_TYPE || mime_type == CODECS_MIME_TYPE
    }

    fn start(&mut self, mime_type: &str, input: EncoderInput, on_data: ChunkCallback) -> Result<(), CaptureError> {
        if !self.is_type_supported(mime_type) {
            return Err(CaptureError::CodecNotSupported(mime_type.to_string()));
        }
        if self.running.is_some() {
            return Err(CaptureError::EncoderFailure("soft encoder already running".into()));
        }

        let mut clock = SessionClock::default();
        clock.start(Instant::now());
        let pipeline = Arc::new(Pipeline {
            video: Arc::clone(&input.video),
            writer: Mutex::new(RecordWriter::new()),
            clock: Mutex::new(clock),
            paused: AtomicBool::new(false),
            dirty: AtomicBool::new(true),
            event_driven: AtomicBool::new(false),
            last_flush: Mutex::new(Instant::now()),
            timeslice: self.timeslice,
            quality: self.quality,
            on_data,
            stats: Arc::clone(&self.stats),
        });

        let mut subscriptions = Vec::new();
        let dirty_pipeline = Arc::clone(&pipeline);
        if let Some(sub) = input.video.on_frame(Arc::new(move || {
            dirty_pipeline.dirty.store(true, Ordering::SeqCst);
        })) {
            pipeline.event_driven.store(true, Ordering::SeqCst);
            subscriptions.push(sub);
        }
        if let Some(audio) = &input.audio {
            let audio_pipeline = Arc::clone(&pipeline);
            subscriptions.push(audio.subscribe(Arc::new(move |samples: &[f32], rate: f64, channels: u16| {
                audio_pipeline.push_audio(samples, rate, channels);
            })));
        }

        let sampler_pipeline = Arc::clone(&pipeline);
        let sampler = Ticker::spawn(
            "soft-encoder",
            Ticker::interval_for_fps(input.frame_rate),
            move || {
                sampler_pipeline.sample_video();
                sampler_pipeline.flush_if_due();
            },
        )?;

        log::info!(
            "soft encoder started: {} @ {} fps, audio={}",
            mime_type,
            input.frame_rate,
            input.audio.is_some()
        );
        self.running = Some(Running {
            pipeline,
            sampler,
            subscriptions,
        });
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(running) = &self.running {
            running.pipeline.paused.store(true, Ordering::SeqCst);
            running.pipeline.clock.lock().pause(Instant::now());
        }
    }

    fn resume(&mut self) {
        if let Some(running) = &self.running {
            running.pipeline.clock.lock().resume(Instant::now());
            running.pipeline.dirty.store(true, Ordering::SeqCst);
            running.pipeline.paused.store(false, Ordering::SeqCst);
        }
    }

    fn request_data(&mut self) {
        if let Some(running) = &self.running {
            running.pipeline.flush();
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        running.sampler.stop();
        for sub in running.subscriptions.drain(..) {
            sub.unsubscribe();
        }
        running.pipeline.flush();
        log::info!(
            "soft encoder stopped: {} frames, {} audio buffers, {} chunks",
            self.stats.frames(),
            self.stats.audio_buffers(),
            self.stats.chunks()
        );
        Ok(())
    }
}

/// Encode one RGBA frame as baseline JPEG.
pub fn encode_jpeg(frame: &VideoFrame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgba = frame
        .to_rgba_image()
        .ok_or_else(|| CaptureError::EncoderFailure("frame buffer size mismatch".into()))?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::EncoderFailure(format!("jpeg encode failed: {}", e)))?;
    Ok(out)
}
