use std::time::{Duration, Instant};

/// Coalesces bursts of source dimension reports into a single resize.
///
/// Sources tend to report their metadata several times while starting up
/// (and again on rotation or window changes); resizing the canvas on each
/// report would keep retargeting the encoder.
#[derive(Debug, Clone)]
pub struct ResizeDebouncer {
    window: Duration,
    current: Option<(u32, u32)>,
    pending: Option<((u32, u32), Instant)>,
}

impl ResizeDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            current: None,
            pending: None,
        }
    }

    /// Start from an already-applied size.
    pub fn with_current(window: Duration, current: (u32, u32)) -> Self {
        Self {
            window,
            current: Some(current),
            pending: None,
        }
    }

    pub fn current(&self) -> Option<(u32, u32)> {
        self.current
    }

    /// Record a reported size. Each new size restarts the quiet window.
    pub fn observe(&mut self, size: (u32, u32), now: Instant) {
        match self.pending {
            Some((pending, _)) if pending == size => {}
            _ if self.current == Some(size) => self.pending = None,
            _ => self.pending = Some((size, now + self.window)),
        }
    }

    /// Size to apply, once the quiet window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<(u32, u32)> {
        let (size, deadline) = self.pending?;
        if now < deadline {
            return None;
        }
        self.pending = None;
        self.current = Some(size);
        Some(size)
    }
}
