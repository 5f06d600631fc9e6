use std::time::{Duration, Instant};

use crate::models::error::{CaptureError, ErrorKind};

/// Elapsed-time accounting that excludes paused spans.
///
/// Every method takes `now` explicitly; the recorder passes
/// `Instant::now()`.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_accum: Duration,
    stopped_at: Option<Instant>,
}

impl SessionClock {
    pub fn start(&mut self, now: Instant) {
        *self = Self {
            started_at: Some(now),
            ..Self::default()
        };
    }

    pub fn pause(&mut self, now: Instant) {
        if self.started_at.is_some() && self.paused_at.is_none() && self.stopped_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_accum += now.saturating_duration_since(paused_at);
        }
    }

    /// Freeze the clock. A pending pause is closed first.
    pub fn stop(&mut self, now: Instant) {
        if self.stopped_at.is_none() {
            self.resume(now);
            self.stopped_at = Some(now);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.stopped_at.or(self.paused_at).unwrap_or(now);
        end.saturating_duration_since(started_at)
            .saturating_sub(self.paused_accum)
    }
}

/// Book-keeping for one recording, created on entering `Preparing`.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub clock: SessionClock,
    pub error: Option<ErrorKind>,
    pub has_audio: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            clock: SessionClock::default(),
            error: None,
            has_audio: false,
        }
    }

    pub fn fail(&mut self, error: &CaptureError) {
        self.error = Some(error.kind());
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}
