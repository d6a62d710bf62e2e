//! Final batch accounting.
//!
//! [`BatchReport`] enumerates every job with its terminal state and failure
//! reason; nothing fails silently. The rendered summary mirrors the block
//! the card tooling prints at the end of a run.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cardforge_core::job::{FailureKind, Job, JobState};
use cardforge_core::progress::ProgressSnapshot;
use cardforge_core::types::JobId;

/// Terminal record for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    /// 0-indexed submission attempts used.
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
}

impl JobOutcome {
    fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            name: job.input.display_name.clone(),
            state: job.state(),
            attempt: job.attempt(),
            remote_handle: job.remote_handle().map(str::to_string),
            artifact: job.result().cloned(),
            error: job.last_error().cloned(),
        }
    }
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: bool,
    pub duration_secs: f64,
    /// `completed * unit_cost`, exactly.
    pub cost: f64,
    /// Terminal jobs per second of wall-clock time.
    pub throughput_per_sec: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every job, keyed by id (ascending), regardless of completion order.
    pub jobs: Vec<JobOutcome>,
}

impl BatchReport {
    pub(crate) fn assemble(
        jobs: Vec<Job>,
        unit_cost: f64,
        snapshot: ProgressSnapshot,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration: Duration,
        cancelled: bool,
    ) -> Self {
        Self {
            total: snapshot.total,
            completed: snapshot.completed,
            failed: snapshot.failed,
            cancelled,
            duration_secs: duration.as_secs_f64(),
            cost: snapshot.cost(unit_cost),
            throughput_per_sec: snapshot.throughput(duration),
            started_at,
            finished_at,
            jobs: jobs.iter().map(JobOutcome::from_job).collect(),
        }
    }

    /// Whether the run succeeded outright: every job completed and no
    /// cancellation occurred. Drives the process exit code.
    pub fn all_completed(&self) -> bool {
        !self.cancelled && self.failed == 0 && self.completed == self.total
    }

    /// The jobs that ended `Failed`, in id order.
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.jobs
            .iter()
            .filter(|outcome| outcome.state == JobState::Failed)
    }

    /// Human-readable run summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "BATCH COMPLETE{}", if self.cancelled { " (CANCELLED)" } else { "" });
        let _ = writeln!(out, "  Total:      {}", self.total);
        let _ = writeln!(out, "  Completed:  {}", self.completed);
        let _ = writeln!(out, "  Failed:     {}", self.failed);
        let _ = writeln!(out, "  Duration:   {:.1}s", self.duration_secs);
        let _ = writeln!(out, "  Cost:       {:.2}", self.cost);
        let _ = writeln!(out, "  Throughput: {:.2} jobs/s", self.throughput_per_sec);
        if self.failures().next().is_some() {
            let _ = writeln!(out, "Failures:");
            for outcome in self.failures() {
                let reason = outcome
                    .error
                    .as_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let _ = writeln!(out, "  [{}] {}: {}", outcome.id, outcome.name, reason);
            }
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardforge_core::job::JobInput;

    fn job(id: JobId, name: &str) -> Job {
        Job::new(
            id,
            JobInput {
                display_name: name.to_string(),
                source: PathBuf::from(format!("assets/{name}.png")),
                template_id: "portrait-v2".to_string(),
                params: serde_json::json!({}),
                output_path: PathBuf::from(format!("output/{name}.png")),
            },
        )
    }

    fn sample_report(cancelled: bool) -> BatchReport {
        let mut completed = job(1, "ada");
        completed.mark_uploading();
        completed.mark_submitted("handle-1".to_string());
        completed.mark_polling();
        completed.mark_completed(PathBuf::from("output/ada.png"));

        let mut failed = job(2, "grace");
        failed.mark_uploading();
        failed.mark_submitted("handle-2".to_string());
        failed.mark_polling();
        failed.mark_failed(FailureKind::Backend {
            reason: "model_error".to_string(),
        });

        let snapshot = ProgressSnapshot {
            total: 2,
            pending: 0,
            in_flight: 0,
            completed: 1,
            failed: 1,
        };
        BatchReport::assemble(
            vec![completed, failed],
            0.25,
            snapshot,
            Utc::now(),
            Utc::now(),
            Duration::from_secs(4),
            cancelled,
        )
    }

    #[test]
    fn cost_and_throughput_derive_from_snapshot() {
        let report = sample_report(false);
        assert_eq!(report.cost, 0.25);
        assert_eq!(report.throughput_per_sec, 0.5);
        assert_eq!(report.duration_secs, 4.0);
    }

    #[test]
    fn all_completed_requires_no_failures() {
        let report = sample_report(false);
        assert!(!report.all_completed());
    }

    #[test]
    fn cancellation_counts_as_failure_for_exit_purposes() {
        let snapshot = ProgressSnapshot {
            total: 0,
            pending: 0,
            in_flight: 0,
            completed: 0,
            failed: 0,
        };
        let report = BatchReport::assemble(
            Vec::new(),
            0.0,
            snapshot,
            Utc::now(),
            Utc::now(),
            Duration::from_secs(1),
            true,
        );
        assert!(!report.all_completed());
    }

    #[test]
    fn failures_lists_only_failed_jobs() {
        let report = sample_report(false);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "grace");
    }

    #[test]
    fn render_includes_counts_and_reasons() {
        let rendered = sample_report(false).render();
        assert!(rendered.contains("BATCH COMPLETE"));
        assert!(rendered.contains("Total:      2"));
        assert!(rendered.contains("Completed:  1"));
        assert!(rendered.contains("Failed:     1"));
        assert!(rendered.contains("model_error"));
        assert!(rendered.contains("grace"));
    }

    #[test]
    fn render_marks_cancelled_runs() {
        let rendered = sample_report(true).render();
        assert!(rendered.contains("(CANCELLED)"));
    }

    #[test]
    fn outcome_serializes_error_details() {
        let report = sample_report(false);
        let json = serde_json::to_value(&report.jobs[1]).expect("outcome serializes");
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"]["kind"], "backend");
        assert_eq!(json["error"]["reason"], "model_error");
    }

    #[test]
    fn outcome_omits_absent_fields() {
        let mut pending = job(3, "mary");
        pending.mark_failed(FailureKind::Validation {
            message: "Source asset not found: assets/mary.png".to_string(),
        });
        let outcome = JobOutcome::from_job(&pending);
        let json = serde_json::to_value(&outcome).expect("outcome serializes");
        assert!(json.get("remote_handle").is_none());
        assert!(json.get("artifact").is_none());
        assert_eq!(json["attempt"], 0);
    }
}
