use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// Event delegate for recorder notifications (the UI collaborator).
///
/// Methods are called from whichever thread drove the change (the caller
/// of a command, a source's termination, or the elapsed timer thread).
/// Implementations should marshal to the UI thread if needed.
pub trait RecorderDelegate: Send + Sync {
    /// Called after every successful state transition.
    fn on_state_changed(&self, state: SessionState);

    /// Called periodically while recording with the elapsed time, pauses excluded.
    fn on_elapsed(&self, elapsed: Duration);

    /// Called when a surfaced error ends the session.
    fn on_error(&self, error: &CaptureError);

    /// Called once the artifact is ready.
    fn on_recording_finished(&self, result: &RecordingResult);
}
