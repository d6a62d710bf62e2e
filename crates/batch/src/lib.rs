//! Batch orchestration: bounded worker pool, coordinator, and final report.
//!
//! The coordinator builds the job set from a validated manifest, the pool
//! drives each job through the transport client under the retry policy, and
//! the report accounts for every job by id regardless of completion order.

use std::path::PathBuf;
use std::time::Duration;

use cardforge_core::retry::RetryPolicy;

pub mod coordinator;
pub mod pool;
pub mod report;

pub use coordinator::BatchCoordinator;
pub use pool::WorkerPool;
pub use report::{BatchReport, JobOutcome};

/// Default number of concurrent workers.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default per-job deadline covering one submission's poll loop.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Default grace period granted to in-flight jobs on cancellation.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Run parameters for one batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of concurrent workers; also the cap on in-flight remote jobs.
    pub pool_size: usize,
    /// Backoff schedule and attempt ceiling shared by retries and polling.
    pub retry: RetryPolicy,
    /// Deadline for a single submission attempt to reach a backend verdict.
    pub job_timeout: Duration,
    /// How long in-flight work may continue after cancellation.
    pub cancel_grace: Duration,
    /// Cost attributed to each completed job.
    pub unit_cost: f64,
    /// Directory artifacts are written into.
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            retry: RetryPolicy::default(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            cancel_grace: DEFAULT_CANCEL_GRACE,
            unit_cost: 0.0,
            output_dir: PathBuf::from("output"),
        }
    }
}
