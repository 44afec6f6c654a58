//! Coarse progress reporting and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{SegmentError, SegmentResult};

/// Receives coarse progress updates from long-running loops.
///
/// Implemented for any `Fn(&str, u8) + Sync` closure, so a caller can forward
/// updates to a status bar without defining a type.
///
/// # Example
///
/// ```
/// use std::sync::Mutex;
/// use voxel_segment::ProgressSink;
///
/// let seen = Mutex::new(Vec::new());
/// let sink = |stage: &str, percent: u8| seen.lock().unwrap().push((stage.to_string(), percent));
/// sink.update("segment", 50);
/// assert_eq!(seen.lock().unwrap().len(), 1);
/// ```
pub trait ProgressSink: Sync {
    /// Called with the current stage name and a completion percentage (0-100).
    fn update(&self, stage: &str, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8) + Sync,
{
    fn update(&self, stage: &str, percent: u8) {
        self(stage, percent);
    }
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _stage: &str, _percent: u8) {}
}

/// Forwards progress updates to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn update(&self, stage: &str, percent: u8) {
        debug!(stage, percent, "progress");
    }
}

/// Emits a progress update roughly every 5% of a loop.
pub(crate) struct ProgressTicker<'a> {
    sink: &'a dyn ProgressSink,
    stage: &'static str,
    total: usize,
    step: usize,
    next: usize,
}

impl<'a> ProgressTicker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, stage: &'static str, total: usize) -> Self {
        let step = (total / 20).max(1);
        Self {
            sink,
            stage,
            total,
            step,
            next: step,
        }
    }

    /// Reports when `done` crosses the next 5% boundary.
    pub(crate) fn tick(&mut self, done: usize) {
        if done >= self.next {
            self.sink.update(self.stage, percent(done, self.total));
            self.next = done.saturating_add(self.step);
        }
    }

    pub(crate) fn finish(&self) {
        self.sink.update(self.stage, 100);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total).saturating_mul(100) / total) as u8
}

/// Shared flag used to abort a pipeline between stages.
///
/// Cloning yields a handle to the same flag, so a UI thread can keep one copy
/// and hand the other to the worker.
///
/// # Example
///
/// ```
/// use voxel_segment::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// assert!(token.check("segment").is_ok());
///
/// handle.cancel();
/// assert!(token.check("segment").unwrap_err().is_canceled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not canceled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns [`SegmentError::Canceled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Canceled`] naming `stage` as the last completed stage.
    pub fn check(&self, stage: &'static str) -> SegmentResult<()> {
        if self.is_canceled() {
            Err(SegmentError::Canceled { stage })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_ticker_reports_about_every_five_percent() {
        let seen = Mutex::new(Vec::new());
        let sink = |_: &str, p: u8| seen.lock().unwrap().push(p);
        let mut ticker = ProgressTicker::new(&sink, "scan", 1000);
        for i in 0..1000 {
            ticker.tick(i);
        }
        ticker.finish();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn test_ticker_small_totals() {
        let seen = Mutex::new(0usize);
        let sink = |_: &str, _: u8| *seen.lock().unwrap() += 1;
        let mut ticker = ProgressTicker::new(&sink, "scan", 3);
        for i in 0..3 {
            ticker.tick(i);
        }
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn test_percent_bounds() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(50, 100), 50);
        assert_eq!(percent(500, 100), 100);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_canceled());
        token.cancel();
        assert!(clone.is_canceled());
        assert!(matches!(
            clone.check("prune"),
            Err(SegmentError::Canceled { stage: "prune" })
        ));
    }

    #[test]
    fn test_builtin_sinks_accept_updates() {
        NoProgress.update("x", 1);
        TracingProgress.update("x", 2);
    }
}
