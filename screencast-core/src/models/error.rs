use thiserror::Error;

use super::state::SessionState;

/// Errors that can occur while capturing, compositing or encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("no supported codec profile (tried: {0})")]
    CodecNotSupported(String),

    #[error("no active capture source")]
    StreamInactive,

    #[error("recording produced no data")]
    EmptyRecording,

    #[error("encoder failure: {0}")]
    EncoderFailure(String),

    #[error("audio graph unavailable: {0}")]
    AudioGraphUnavailable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

/// Fieldless mirror of [`CaptureError`], stored on the recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTransition,
    CodecNotSupported,
    StreamInactive,
    EmptyRecording,
    EncoderFailure,
    AudioGraphUnavailable,
    ConfigurationFailed,
    StorageError,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::CodecNotSupported(_) => ErrorKind::CodecNotSupported,
            Self::StreamInactive => ErrorKind::StreamInactive,
            Self::EmptyRecording => ErrorKind::EmptyRecording,
            Self::EncoderFailure(_) => ErrorKind::EncoderFailure,
            Self::AudioGraphUnavailable(_) => ErrorKind::AudioGraphUnavailable,
            Self::ConfigurationFailed(_) => ErrorKind::ConfigurationFailed,
            Self::StorageError(_) => ErrorKind::StorageError,
        }
    }

    /// Whether this error is reported to the UI collaborator.
    ///
    /// Transition races are rejected locally and audio graph failures
    /// fall back to passthrough, so neither reaches the delegate.
    pub fn is_surfaced(&self) -> bool {
        !matches!(
            self,
            Self::InvalidTransition { .. } | Self::AudioGraphUnavailable(_)
        )
    }

    /// Whether a fresh, user-initiated session can be expected to succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::CodecNotSupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_errors_are_not_surfaced() {
        let race = CaptureError::InvalidTransition {
            from: SessionState::Recording,
            to: SessionState::Preparing,
        };
        assert!(!race.is_surfaced());
        assert!(!CaptureError::AudioGraphUnavailable("no host".into()).is_surfaced());
        assert!(CaptureError::EmptyRecording.is_surfaced());
    }

    #[test]
    fn codec_failure_is_fatal() {
        let err = CaptureError::CodecNotSupported("video/webm".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::CodecNotSupported);
        assert!(CaptureError::StreamInactive.is_recoverable());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = CaptureError::InvalidTransition {
            from: SessionState::Idle,
            to: SessionState::Recording,
        };
        assert_eq!(err.to_string(), "invalid transition from idle to recording");
    }
}
