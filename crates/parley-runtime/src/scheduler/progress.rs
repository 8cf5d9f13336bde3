//! Monotonic batch progress accounting.
//!
//! Counters are atomics so that many concurrently completing sessions can
//! record without lost updates; each scenario is recorded exactly once
//! (the scheduler guards recording with its per-scenario ledger).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parley_core::batch::BatchStatus;

/// Converts scenario completions into monotonic batch progress.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u32,
    completed: AtomicU32,
    failed: AtomicU32,
    started: AtomicBool,
}

impl ProgressTracker {
    /// Create a tracker for a batch of `total` scenarios.
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            started: AtomicBool::new(false),
        }
    }

    /// Mark the batch as executing.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Record one scenario completion. Failures count as completed too.
    ///
    /// Returns the updated `(completed, failed)` pair.
    pub fn record(&self, failure: bool) -> (u32, u32) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(completed <= self.total, "recorded more scenarios than submitted");
        let failed = if failure {
            self.failed.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.failed.load(Ordering::Acquire)
        };
        (completed, failed)
    }

    /// Scenarios that reached a terminal status.
    #[must_use]
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }

    /// Scenarios whose terminal status counts as a failure.
    #[must_use]
    pub fn failed(&self) -> u32 {
        self.failed.load(Ordering::Acquire)
    }

    /// Total scenario count.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Completion percentage; an empty batch reads as fully complete.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        f64::from(self.completed()) / f64::from(self.total) * 100.0
    }

    /// Whether every scenario has been recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed() >= self.total
    }

    /// Derived batch status: created → running → completed, where
    /// completed requires every scenario recorded.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        if self.is_complete() && self.started.load(Ordering::Acquire) {
            BatchStatus::Completed
        } else if self.started.load(Ordering::Acquire) {
            BatchStatus::Running
        } else {
            BatchStatus::Created
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fresh_tracker_is_created() {
        let t = ProgressTracker::new(4);
        assert_eq!(t.status(), BatchStatus::Created);
        assert_eq!(t.completed(), 0);
        assert!((t.progress()).abs() < f64::EPSILON);
    }

    #[test]
    fn started_tracker_is_running() {
        let t = ProgressTracker::new(4);
        t.mark_started();
        assert_eq!(t.status(), BatchStatus::Running);
    }

    #[test]
    fn record_counts_failures_as_completed() {
        let t = ProgressTracker::new(2);
        t.mark_started();
        assert_eq!(t.record(false), (1, 0));
        assert_eq!(t.record(true), (2, 1));
        assert_eq!(t.status(), BatchStatus::Completed);
        assert!((t.progress() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_batch_reads_complete() {
        let t = ProgressTracker::new(0);
        t.mark_started();
        assert!((t.progress() - 100.0).abs() < f64::EPSILON);
        assert_eq!(t.status(), BatchStatus::Completed);
    }

    #[test]
    fn progress_is_monotone_under_recording() {
        let t = ProgressTracker::new(10);
        t.mark_started();
        let mut last = 0.0;
        for i in 0..10 {
            let _ = t.record(i % 3 == 0);
            let p = t.progress();
            assert!(p >= last);
            last = p;
        }
        assert!((last - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_recording_loses_no_updates() {
        let t = Arc::new(ProgressTracker::new(64));
        t.mark_started();
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    let _ = t.record(i % 2 == 0);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.completed(), 64);
        assert_eq!(t.failed(), 32);
        assert_eq!(t.status(), BatchStatus::Completed);
    }
}
