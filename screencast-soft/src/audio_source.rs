//! Synthetic audio source delivering a sine tone in fixed-size buffers.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use screencast_core::models::error::CaptureError;
use screencast_core::render::ticker::Ticker;
use screencast_core::traits::audio_track::{AudioBufferCallback, AudioTrack};
use screencast_core::traits::subscription::{ListenerSet, Subscription};
use screencast_core::traits::video_track::EndedListener;

type BufferListener = dyn Fn(&[f32], f64, u16) + Send + Sync;
type Listener = dyn Fn() + Send + Sync;

/// Shape of the generated signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f64,
    pub amplitude: f32,
    pub sample_rate: f64,
    pub channels: u16,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.25,
            sample_rate: 48_000.0,
            channels: 1,
        }
    }
}

impl Tone {
    /// Interleaved samples for frames `[start, start + frames)`.
    pub fn samples(&self, start: u64, frames: usize) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        let mut out = Vec::with_capacity(frames * channels);
        for i in 0..frames as u64 {
            let t = (start + i) as f64 / self.sample_rate;
            let value = (TAU * self.frequency * t).sin() as f32 * self.amplitude;
            out.extend(std::iter::repeat(value).take(channels));
        }
        out
    }
}

struct SourceInner {
    name: String,
    ended: AtomicBool,
    buffers: AtomicU64,
    clones: AtomicU64,
    subscribers: ListenerSet<BufferListener>,
    ended_listeners: ListenerSet<Listener>,
}

/// A running synthetic audio source. Dropping it ends it.
pub struct SoftAudioSource {
    inner: Arc<SourceInner>,
    producer: Mutex<Option<Ticker>>,
}

impl SoftAudioSource {
    /// Start delivering `tone` every `buffer` interval.
    pub fn spawn(name: &str, tone: Tone, buffer: Duration) -> Result<Self, CaptureError> {
        let inner = Arc::new(SourceInner {
            name: name.to_string(),
            ended: AtomicBool::new(false),
            buffers: AtomicU64::new(0),
            clones: AtomicU64::new(0),
            subscribers: ListenerSet::new(),
            ended_listeners: ListenerSet::new(),
        });

        let frames_per_buffer = ((tone.sample_rate * buffer.as_secs_f64()).round() as usize).max(1);
        let producer_inner = Arc::clone(&inner);
        let mut position = 0u64;
        let producer = Ticker::spawn(&format!("soft-audio-{}", name), buffer, move || {
            let samples = tone.samples(position, frames_per_buffer);
            position += frames_per_buffer as u64;
            producer_inner.buffers.fetch_add(1, Ordering::SeqCst);
            for subscriber in producer_inner.subscribers.snapshot() {
                subscriber(&samples, tone.sample_rate, tone.channels);
            }
        })?;
        log::debug!(
            "audio source {} started: {} Hz, {} ch, {} frames per buffer",
            name,
            tone.sample_rate,
            tone.channels,
            frames_per_buffer
        );

        Ok(Self {
            inner,
            producer: Mutex::new(Some(producer)),
        })
    }

    pub fn track(&self) -> Arc<dyn AudioTrack> {
        Arc::new(SoftAudioTrack {
            id: self.inner.name.clone(),
            source: Arc::clone(&self.inner),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// End the source as its owner would. Later calls are ignored.
    pub fn end(&self) {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let producer = self.producer.lock().take();
        if let Some(mut producer) = producer {
            producer.stop();
        }
        self.inner.subscribers.clear();

        log::info!("audio source {} ended", self.inner.name);
        for listener in self.inner.ended_listeners.snapshot() {
            listener();
        }
    }

    pub fn buffers_delivered(&self) -> u64 {
        self.inner.buffers.load(Ordering::SeqCst)
    }
}

impl Drop for SoftAudioSource {
    fn drop(&mut self) {
        self.end();
    }
}

/// A handle onto a [`SoftAudioSource`].
pub struct SoftAudioTrack {
    id: String,
    source: Arc<SourceInner>,
    stopped: Arc<AtomicBool>,
}

impl AudioTrack for SoftAudioTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_live(&self) -> bool {
        !self.source.ended.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn subscribe(&self, callback: AudioBufferCallback) -> Subscription {
        let stopped = Arc::clone(&self.stopped);
        self.source
            .subscribers
            .add(Arc::new(move |samples: &[f32], rate: f64, channels: u16| {
                if !stopped.load(Ordering::SeqCst) {
                    callback(samples, rate, channels);
                }
            }))
    }

    fn on_ended(&self, listener: EndedListener) -> Subscription {
        let stopped = Arc::clone(&self.stopped);
        self.source.ended_listeners.add(Arc::new(move || {
            if !stopped.load(Ordering::SeqCst) {
                listener();
            }
        }))
    }

    fn clone_track(&self) -> Arc<dyn AudioTrack> {
        let n = self.source.clones.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(SoftAudioTrack {
            id: format!("{}#{}", self.source.name, n),
            source: Arc::clone(&self.source),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
