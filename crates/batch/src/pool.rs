//! Bounded worker pool driving queued jobs through the backend.
//!
//! A fixed number of workers drain a shared queue of pending jobs. Each
//! worker owns one job at a time end-to-end (upload -> submit -> poll ->
//! retrieve), applying the retry policy on transient failures, so at most
//! `pool_size` jobs hold a live remote handle at any instant. Only the
//! queue itself is synchronized; job contents have a single writer.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cardforge_core::job::{FailureKind, Job, JobState};
use cardforge_core::progress::ProgressCounters;
use cardforge_core::template::TemplateSet;
use cardforge_core::types::JobId;
use cardforge_transport::{Backend, JobStatus, PushEvent, TransportError};

use crate::BatchConfig;

/// Shared context cloned into each worker task.
struct WorkerContext<B> {
    backend: Arc<B>,
    templates: Arc<TemplateSet>,
    config: Arc<BatchConfig>,
    counters: Arc<ProgressCounters>,
    cancel: CancellationToken,
    push_events: Option<broadcast::Sender<PushEvent>>,
    queue: Arc<Mutex<VecDeque<Job>>>,
}

/// Fixed-size pool of concurrent workers.
pub struct WorkerPool<B> {
    backend: Arc<B>,
    templates: Arc<TemplateSet>,
    config: Arc<BatchConfig>,
    counters: Arc<ProgressCounters>,
    cancel: CancellationToken,
    push_events: Option<broadcast::Sender<PushEvent>>,
}

impl<B: Backend + 'static> WorkerPool<B> {
    pub fn new(
        backend: Arc<B>,
        templates: Arc<TemplateSet>,
        config: Arc<BatchConfig>,
        counters: Arc<ProgressCounters>,
        cancel: CancellationToken,
        push_events: Option<broadcast::Sender<PushEvent>>,
    ) -> Self {
        Self {
            backend,
            templates,
            config,
            counters,
            cancel,
            push_events,
        }
    }

    /// Drain `jobs` to terminal states and return them.
    ///
    /// Spawns `pool_size` worker tasks over a shared queue and waits for
    /// all of them; completion order across jobs is unconstrained.
    pub async fn run(&self, jobs: Vec<Job>) -> Vec<Job> {
        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let mut handles = Vec::with_capacity(self.config.pool_size);

        for worker_idx in 0..self.config.pool_size {
            let ctx = WorkerContext {
                backend: Arc::clone(&self.backend),
                templates: Arc::clone(&self.templates),
                config: Arc::clone(&self.config),
                counters: Arc::clone(&self.counters),
                cancel: self.cancel.clone(),
                push_events: self.push_events.clone(),
                queue: Arc::clone(&queue),
            };
            handles.push(tokio::spawn(worker_loop(worker_idx, ctx)));
        }

        let mut finished = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(mut jobs) => finished.append(&mut jobs),
                Err(e) => tracing::error!(error = %e, "Worker task failed"),
            }
        }
        finished
    }
}

/// One worker: pull a pending job, drive it to a terminal state, repeat
/// until the queue is empty.
async fn worker_loop<B: Backend>(worker_idx: usize, ctx: WorkerContext<B>) -> Vec<Job> {
    let mut finished = Vec::new();

    loop {
        let next = {
            let mut queue = ctx
                .queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.pop_front()
        };
        let Some(mut job) = next else { break };

        if ctx.cancel.is_cancelled() {
            // Cancellation stops dequeuing: everything still queued fails
            // without a remote call.
            job.mark_failed(FailureKind::Cancelled);
            ctx.counters.record_failed_without_start();
            finished.push(job);
            continue;
        }

        ctx.counters.record_started();
        tracing::info!(
            worker_idx,
            job_id = job.id,
            name = %job.input.display_name,
            attempt = job.attempt(),
            "Job started",
        );

        process_job(&ctx, &mut job).await;

        match job.state() {
            JobState::Completed => ctx.counters.record_completed(),
            _ => ctx.counters.record_failed(),
        }
        let snapshot = ctx.counters.snapshot();
        tracing::info!(
            worker_idx,
            job_id = job.id,
            state = job.state().label(),
            completed = snapshot.completed,
            failed = snapshot.failed,
            in_flight = snapshot.in_flight,
            pending = snapshot.pending,
            "Job finished",
        );
        finished.push(job);
    }

    finished
}

/// Drive one job to a terminal state, retrying retryable failures with the
/// configured backoff. The job never leaves this worker between attempts.
async fn process_job<B: Backend>(ctx: &WorkerContext<B>, job: &mut Job) {
    loop {
        let outcome = {
            let attempt = run_attempt(ctx, job);
            tokio::pin!(attempt);
            tokio::select! {
                outcome = &mut attempt => outcome,
                _ = ctx.cancel.cancelled() => {
                    // Let the in-flight attempt finish within the grace
                    // period; it may still reach a real verdict.
                    match tokio::time::timeout(ctx.config.cancel_grace, &mut attempt).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(FailureKind::Cancelled),
                    }
                }
            }
        };

        match outcome {
            Ok(artifact) => {
                job.mark_completed(artifact);
                return;
            }
            Err(error) => {
                let may_retry = error.is_retryable()
                    && ctx.config.retry.allows_retry(job.attempt())
                    && !ctx.cancel.is_cancelled();
                if !may_retry {
                    tracing::warn!(
                        job_id = job.id,
                        attempt = job.attempt(),
                        error = %error,
                        "Job failed",
                    );
                    job.mark_failed(error);
                    return;
                }

                let delay = ctx.config.retry.delay_for(job.attempt());
                tracing::warn!(
                    job_id = job.id,
                    attempt = job.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying job",
                );
                job.begin_retry(error);

                // Wait before the next attempt, respecting cancellation.
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        job.mark_failed(FailureKind::Cancelled);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// One full pass: upload -> submit -> poll -> retrieve -> write artifact.
///
/// Advances the job's non-terminal state markers as it goes; terminal
/// transitions belong to the caller. Every pass performs a fresh upload and
/// submission, so a retried job never reuses a stale remote handle.
async fn run_attempt<B: Backend>(
    ctx: &WorkerContext<B>,
    job: &mut Job,
) -> Result<PathBuf, FailureKind> {
    job.mark_uploading();
    let deadline = Instant::now() + ctx.config.job_timeout;

    let bytes = tokio::fs::read(&job.input.source).await.map_err(|e| {
        FailureKind::Validation {
            message: format!("Failed to read source {}: {e}", job.input.source.display()),
        }
    })?;
    let asset_ref = ctx
        .backend
        .upload(bytes)
        .await
        .map_err(transport_failure)?;

    let template = ctx
        .templates
        .get(&job.input.template_id)
        .map_err(|e| FailureKind::Validation {
            message: e.to_string(),
        })?;
    let handle = ctx
        .backend
        .submit(template.graph(), &asset_ref, &job.input.params)
        .await
        .map_err(transport_failure)?;
    job.mark_submitted(handle.clone());
    tracing::debug!(job_id = job.id, remote_handle = %handle, "Submitted");

    job.mark_polling();
    poll_until_verdict(ctx, job.id, &handle, deadline).await?;

    let artifact = ctx
        .backend
        .result(&handle)
        .await
        .map_err(transport_failure)?;
    write_artifact(&job.input.output_path, &artifact).await?;
    Ok(job.input.output_path.clone())
}

/// Wait for the backend to report a verdict for `handle`.
///
/// Status checks are paced by the backoff schedule, shortcut by push events
/// for this handle when the push channel is attached. `Ok(())` means the
/// backend reported success and the artifact can be retrieved.
async fn poll_until_verdict<B: Backend>(
    ctx: &WorkerContext<B>,
    job_id: JobId,
    handle: &str,
    deadline: Instant,
) -> Result<(), FailureKind> {
    let mut push_rx = ctx.push_events.as_ref().map(|tx| tx.subscribe());
    let mut poll_idx: u32 = 0;

    // First check happens immediately; subsequent checks wait out the
    // backoff schedule or a push event, whichever fires first.
    let mut status = ctx.backend.status(handle).await.map_err(transport_failure)?;

    loop {
        // A verdict fetched during the cancellation grace window still
        // counts; cancellation only stops further waiting.
        match status {
            JobStatus::Succeeded => return Ok(()),
            JobStatus::Failed { reason } => return Err(FailureKind::Backend { reason }),
            JobStatus::Queued | JobStatus::Running => {}
            JobStatus::NotFound => {
                // The backend may briefly lag behind its own submit
                // acknowledgement; give it poll time under the deadline.
                tracing::debug!(job_id, remote_handle = %handle, "Handle not known to backend yet");
            }
        }
        if ctx.cancel.is_cancelled() {
            return Err(FailureKind::Cancelled);
        }

        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return Err(FailureKind::TimedOut);
        };
        let wait = ctx.config.retry.delay_for(poll_idx).min(remaining);
        poll_idx = poll_idx.saturating_add(1);

        status = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(FailureKind::Cancelled),
            event = recv_for_handle(&mut push_rx, handle) => event.into_status(),
            _ = tokio::time::sleep(wait) => {
                if Instant::now() >= deadline {
                    return Err(FailureKind::TimedOut);
                }
                ctx.backend.status(handle).await.map_err(transport_failure)?
            }
        };
    }
}

/// Resolve to the next push event for `handle`; pends forever when no push
/// channel is attached or the listener has gone away, leaving the timer
/// branch in charge.
async fn recv_for_handle(
    push_rx: &mut Option<broadcast::Receiver<PushEvent>>,
    handle: &str,
) -> PushEvent {
    let Some(rx) = push_rx else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) if event.remote_handle == handle => return event,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Push receiver lagged, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
        }
    }
}

fn transport_failure(e: TransportError) -> FailureKind {
    FailureKind::Transport {
        retryable: e.is_retryable(),
        message: e.to_string(),
    }
}

/// Write the retrieved artifact, creating the output directory on demand.
async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), FailureKind> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FailureKind::Validation {
                message: format!("Failed to create output directory {}: {e}", parent.display()),
            })?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| FailureKind::Validation {
            message: format!("Failed to write artifact {}: {e}", path.display()),
        })?;
    Ok(())
}
