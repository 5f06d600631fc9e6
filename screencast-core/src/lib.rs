//! # screencast-core
//!
//! Platform-agnostic screen + camera recording core.
//!
//! Composites a screen source and a camera overlay onto one canvas, mixes
//! any number of audio sources, and drives a host encoder into a single
//! artifact. Host backends implement [`VideoTrack`], [`AudioTrack`] and
//! [`EncoderBackend`] and hand them to a [`ScreenRecorder`].
//!
//! ## Architecture
//!
//! ```text
//! screencast-core (this crate)
//! ├── traits/       ← VideoTrack, AudioTrack, EncoderBackend, RecorderDelegate, Subscription
//! ├── models/       ← CaptureError, SessionState, RecorderConfiguration, VideoFrame, CaptureSource
//! ├── compositing/  ← FrameCompositor, overlay geometry, resize debouncing
//! ├── processing/   ← AudioMixingGraph, DynamicsCompressor, RingBuffer, PCM helpers
//! ├── render/       ← RenderDriver (passthrough / foreground / background), CanvasTrack, Ticker
//! ├── encoder/      ← codec negotiation, EncoderDriver, chunk collection
//! ├── session/      ← ScreenRecorder, SessionStateMachine, ResourceLifecycle
//! └── storage/      ← artifact + metadata sidecar export
//! ```

pub mod compositing;
pub mod encoder;
pub mod models;
pub mod processing;
pub mod render;
pub mod session;
pub mod storage;
pub mod traits;

pub use compositing::compositor::FrameCompositor;
pub use encoder::codec::CodecProfile;
pub use models::config::{Anchor, AudioMixConfig, CompositionConfig, Layout, RecorderConfiguration, Visibility};
pub use models::error::{CaptureError, ErrorKind};
pub use models::frame::VideoFrame;
pub use models::recording_result::{EncodedArtifact, RecorderDiagnostics, RecordingMetadata, RecordingResult};
pub use models::source::{CaptureSource, SourceKind};
pub use models::state::SessionState;
pub use processing::audio_mixer::AudioMixer;
pub use processing::ring_buffer::RingBuffer;
pub use render::driver::RenderStrategy;
pub use session::recorder::ScreenRecorder;
pub use storage::artifact_writer::write_artifact;
pub use storage::metadata::read_metadata;
pub use traits::audio_track::{AudioBufferCallback, AudioTrack};
pub use traits::encoder_backend::{ChunkCallback, EncoderBackend, EncoderInput};
pub use traits::recorder_delegate::RecorderDelegate;
pub use traits::subscription::{ListenerSet, Subscription};
pub use traits::video_track::{EndedListener, FrameListener, VideoTrack};
