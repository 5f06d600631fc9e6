//! # screencast-soft
//!
//! Software host backend for screencast-core.
//!
//! Provides:
//! - `SoftVideoSource` / `SoftVideoTrack`: synthetic screen or camera frames on a ticker thread
//! - `SoftAudioSource` / `SoftAudioTrack`: sine tone buffers
//! - `SoftEncoder`: `video/x-screencast-mjpeg` encoder (JPEG frames + 16-bit PCM)
//! - `container`: reader and writer for that stream
//!
//! ## Usage
//! ```ignore
//! use screencast_core::{CaptureSource, RecorderConfiguration, ScreenRecorder};
//! use screencast_soft::{Pattern, SoftEncoder, SoftVideoSource};
//!
//! let screen = SoftVideoSource::spawn("screen", 1280, 720, 30, Pattern::Bars)?;
//! let config = RecorderConfiguration {
//!     codec_preferences: SoftEncoder::codec_preferences(),
//!     ..Default::default()
//! };
//! let recorder = ScreenRecorder::new(SoftEncoder::new(), config)?;
//! recorder.start(&[CaptureSource::screen(screen.track(), None)])?;
//! let result = recorder.stop()?;
//! ```

pub mod audio_source;
pub mod container;
pub mod encoder;
pub mod video_source;

pub use audio_source::{SoftAudioSource, SoftAudioTrack, Tone};
pub use container::{read_records, ContainerError, Record};
pub use encoder::{EncoderStats, SoftEncoder};
pub use video_source::{Pattern, SoftVideoSource, SoftVideoTrack};
