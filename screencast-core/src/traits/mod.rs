pub mod audio_track;
pub mod encoder_backend;
pub mod recorder_delegate;
pub mod subscription;
pub mod video_track;
