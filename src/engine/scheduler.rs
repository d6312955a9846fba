// Recompute scheduling
// RecomputeScheduler is the clock-free debounce state the engine owns;
// DebounceTimer is the tokio timer the async service arms from it

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub armed: u64,
    pub superseded: u64,
    pub runs: u64,
    pub suppressed: u64,
    pub cancelled: u64,
}

/// Single pending deadline plus an in-progress guard
#[derive(Debug, Clone)]
pub struct RecomputeScheduler {
    debounce_ms: i64,
    deadline: Option<i64>,
    calculating: bool,
    stats: SchedulerStats,
}

impl RecomputeScheduler {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms: debounce_ms as i64,
            deadline: None,
            calculating: false,
            stats: SchedulerStats::default(),
        }
    }

    /// (Re)arm the pending recompute; a newer tick replaces the old deadline
    pub fn arm(&mut self, now_ms: i64) {
        if self.deadline.is_some() {
            self.stats.superseded += 1;
        }
        self.deadline = Some(now_ms + self.debounce_ms);
        self.stats.armed += 1;
    }

    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.stats.cancelled += 1;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<i64> {
        self.deadline
    }

    /// Deadline passed and nothing is running
    pub fn due(&self, now_ms: i64) -> bool {
        !self.calculating && self.deadline.is_some_and(|d| now_ms >= d)
    }

    /// Enter the recompute. Returns false while another one is running.
    pub fn begin(&mut self) -> bool {
        if self.calculating {
            self.stats.suppressed += 1;
            trace!("Recompute suppressed, one already running");
            return false;
        }
        self.calculating = true;
        self.deadline = None;
        true
    }

    pub fn finish(&mut self) {
        if self.calculating {
            self.calculating = false;
            self.stats.runs += 1;
        }
    }

    pub fn is_calculating(&self) -> bool {
        self.calculating
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms as u64
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

/// One pending tokio timer; arming again aborts the previous one
#[derive(Debug, Default)]
pub struct DebounceTimer {
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Must be called from inside a tokio runtime
    pub fn arm<F>(&mut self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_newer_tick_replaces_deadline() {
        let mut s = RecomputeScheduler::new(1000);
        s.arm(0);
        s.arm(600);
        assert!(!s.due(1000));
        assert!(s.due(1600));
        assert_eq!(s.stats().superseded, 1);
    }

    #[test]
    fn test_guard_suppresses_overlap() {
        let mut s = RecomputeScheduler::new(1000);
        s.arm(0);
        assert!(s.begin());
        s.arm(100);
        assert!(!s.due(5_000));
        assert!(!s.begin());
        s.finish();
        assert!(s.due(5_000));
        assert_eq!(s.stats().runs, 1);
        assert_eq!(s.stats().suppressed, 1);
    }

    #[test]
    fn test_cancel_clears_pending() {
        let mut s = RecomputeScheduler::new(1000);
        s.arm(0);
        s.cancel();
        assert!(!s.is_pending());
        assert!(!s.due(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_for_burst() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DebounceTimer::new();
        for _ in 0..5 {
            let fired = fired.clone();
            timer.arm(Duration::from_millis(1000), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cancel() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DebounceTimer::new();
        let f = fired.clone();
        timer.arm(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_pending());
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.is_pending());
    }
}
