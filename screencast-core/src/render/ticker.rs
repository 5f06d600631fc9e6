use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::error::CaptureError;

/// Fixed-interval callback on a dedicated named thread.
///
/// Ticks are scheduled against absolute deadlines so a slow tick does not
/// shift the ones after it; missed deadlines are skipped, not replayed.
pub struct Ticker {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self, CaptureError>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(CaptureError::ConfigurationFailed(format!("{name}: tick interval must be positive")));
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                while flag.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                    if !flag.load(Ordering::SeqCst) {
                        break;
                    }
                    tick();
                    next += interval;
                    let now = Instant::now();
                    if next < now {
                        next = now + interval;
                    }
                }
            })
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to spawn {name} thread: {e}")))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Fps expressed as a tick interval.
    pub fn interval_for_fps(fps: u32) -> Duration {
        Duration::from_secs_f64(1.0 / fps.max(1) as f64)
    }

    /// Stop ticking without waiting. A tick already running completes on
    /// its own.
    pub fn detach(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.take();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop ticking and wait for the thread.
    ///
    /// When called from inside a tick the thread is left to exit on its own.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut ticker = Ticker::spawn("test-ticker", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        ticker.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 3, "only {after_stop} ticks");

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        assert!(!ticker.is_running());
    }

    #[test]
    fn detach_stops_without_joining() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::spawn("test-detach", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        ticker.detach();
        thread::sleep(Duration::from_millis(30));
        let settled = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(Ticker::spawn("zero", Duration::ZERO, || {}).is_err());
    }

    #[test]
    fn fps_interval() {
        assert_eq!(Ticker::interval_for_fps(20), Duration::from_millis(50));
        assert_eq!(Ticker::interval_for_fps(0), Duration::from_secs(1));
    }
}
