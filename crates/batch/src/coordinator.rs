//! Batch construction, execution, and final accounting.
//!
//! The coordinator owns the run: it turns the manifest into a fixed job
//! set (rejecting bad entries individually before any remote call), starts
//! the worker pool, blocks until every job is terminal, and assembles the
//! report. One job's failure never aborts the batch; only cancellation
//! winds the run down early.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use cardforge_core::job::{FailureKind, Job, JobInput};
use cardforge_core::manifest::{self, Manifest};
use cardforge_core::naming;
use cardforge_core::progress::ProgressCounters;
use cardforge_core::template::TemplateSet;
use cardforge_core::types::JobId;
use cardforge_transport::{Backend, PushEvent};

use crate::pool::WorkerPool;
use crate::report::BatchReport;
use crate::BatchConfig;

/// Builds, runs, and accounts for one batch.
pub struct BatchCoordinator<B> {
    backend: Arc<B>,
    templates: Arc<TemplateSet>,
    config: Arc<BatchConfig>,
    cancel: CancellationToken,
    push_events: Option<broadcast::Sender<PushEvent>>,
}

impl<B: Backend + 'static> BatchCoordinator<B> {
    pub fn new(backend: Arc<B>, templates: TemplateSet, config: BatchConfig) -> Self {
        Self {
            backend,
            templates: Arc::new(templates),
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            push_events: None,
        }
    }

    /// Attach a push-event source so worker poll loops become event-driven.
    pub fn with_push_events(mut self, events: broadcast::Sender<PushEvent>) -> Self {
        self.push_events = Some(events);
        self
    }

    /// Token observed by every worker; cancel it to wind the run down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the batch to completion and report on every job.
    ///
    /// Returns once all jobs are terminal. The report's entries are keyed
    /// by job id, so concurrent completion in any order is fine.
    pub async fn run(&self, manifest: Manifest) -> BatchReport {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let (pending, rejected) = self.build_jobs(manifest);
        let total = (pending.len() + rejected.len()) as u64;
        let counters = Arc::new(ProgressCounters::new(total));
        for _ in &rejected {
            counters.record_failed_without_start();
        }

        tracing::info!(
            total,
            valid = pending.len(),
            rejected = rejected.len(),
            pool_size = self.config.pool_size,
            "Batch starting",
        );

        let pool = WorkerPool::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.templates),
            Arc::clone(&self.config),
            Arc::clone(&counters),
            self.cancel.clone(),
            self.push_events.clone(),
        );
        let mut jobs = pool.run(pending).await;
        jobs.extend(rejected);
        jobs.sort_by_key(|job| job.id);

        let report = BatchReport::assemble(
            jobs,
            self.config.unit_cost,
            counters.snapshot(),
            started_at,
            Utc::now(),
            clock.elapsed(),
            self.cancel.is_cancelled(),
        );
        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            cost = report.cost,
            duration_secs = report.duration_secs,
            "Batch finished",
        );
        report
    }

    /// Build the fixed job set from the manifest.
    ///
    /// Entries that fail local validation (missing or unreadable source,
    /// unknown template, malformed params) become terminal `Failed` jobs
    /// without any remote call; the rest start `Pending`. Job ids follow
    /// manifest order.
    fn build_jobs(&self, manifest: Manifest) -> (Vec<Job>, Vec<Job>) {
        let known = self.templates.ids();
        let mut taken = HashSet::new();
        let mut pending = Vec::new();
        let mut rejected = Vec::new();

        for (idx, entry) in manifest.entries.into_iter().enumerate() {
            let id = idx as JobId + 1;
            let verdict = manifest::validate_entry(&entry, &known);

            let display_name = entry.display_name();
            let file_name = naming::artifact_file_name(&display_name, id, &mut taken);
            let mut job = Job::new(
                id,
                JobInput {
                    display_name,
                    source: entry.source,
                    template_id: entry.template,
                    params: entry.params,
                    output_path: self.config.output_dir.join(file_name),
                },
            );

            match verdict {
                Ok(()) => pending.push(job),
                Err(e) => {
                    tracing::warn!(job_id = id, error = %e, "Manifest entry rejected");
                    job.mark_failed(FailureKind::Validation {
                        message: e.to_string(),
                    });
                    rejected.push(job);
                }
            }
        }

        (pending, rejected)
    }
}
