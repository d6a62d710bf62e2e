//! Run-wide progress and cost accounting.
//!
//! [`ProgressCounters`] holds atomic counters updated exclusively by worker
//! state transitions; [`ProgressSnapshot`] derives throughput, ETA, and cost
//! as read-only projections with no effect on scheduling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Atomic per-run job counters.
///
/// `pending` is derived (`total - in_flight - completed - failed`) rather
/// than stored, so the accounting identity holds at every snapshot. Each
/// transition is recorded by the single worker owning the job; no counter
/// has more than one writer per job.
pub struct ProgressCounters {
    total: u64,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl ProgressCounters {
    /// Create counters for a batch of `total` jobs, all pending.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            in_flight: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Fixed batch size for this run.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// A worker pulled a job off the queue and began processing it.
    pub fn record_started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// An in-flight job reached `Completed`.
    ///
    /// `in_flight` must be released before `completed` is bumped; a
    /// snapshot taken between the two operations must never count the
    /// job twice.
    pub fn record_completed(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// An in-flight job reached `Failed`.
    pub fn record_failed(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// A job failed before any worker picked it up (validation failure or
    /// cancellation of a still-queued job).
    pub fn record_failed_without_start(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Read a consistent view of the counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        ProgressSnapshot {
            total: self.total,
            pending: self
                .total
                .saturating_sub(in_flight)
                .saturating_sub(completed)
                .saturating_sub(failed),
            in_flight,
            completed,
            failed,
        }
    }
}

/// Point-in-time view of batch progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub pending: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
}

impl ProgressSnapshot {
    /// Whether every job has reached a terminal state.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }

    /// Cost accrued so far: `completed * unit_cost`, exactly.
    pub fn cost(&self, unit_cost: f64) -> f64 {
        self.completed as f64 * unit_cost
    }

    /// Terminal jobs per second over `elapsed`. Zero before any job
    /// finishes or when no time has passed.
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.completed + self.failed) as f64 / secs
    }

    /// Projected time until the batch drains, extrapolated from the
    /// throughput so far. `None` until at least one job has finished.
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let rate = self.throughput(elapsed);
        if rate <= 0.0 {
            return None;
        }
        let remaining = (self.pending + self.in_flight) as f64;
        Some(Duration::from_secs_f64(remaining / rate))
    }
}
