//! Job data model and lifecycle state machine.
//!
//! A [`Job`] tracks one (source asset, workflow template) pair from `Pending`
//! through upload, submission, and polling to a terminal `Completed` or
//! `Failed` state. The state machine is pure so transition legality can be
//! checked without any network or runtime dependency.

use std::path::PathBuf;

use serde::Serialize;

use crate::types::JobId;

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a single generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the shared queue; no remote call made yet.
    Pending,
    /// A worker is uploading the source asset to the backend.
    Uploading,
    /// The backend accepted the submission and assigned a remote handle.
    Submitted,
    /// Waiting for the backend to report a verdict for the remote handle.
    Polling,
    /// Artifact retrieved and written to disk.
    Completed,
    /// Terminal failure; the reason is recorded on the job.
    Failed,
}

impl JobState {
    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Uploading => "Uploading",
            Self::Submitted => "Submitted",
            Self::Polling => "Polling",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Whether no further transition is possible in the current run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Legal transitions between [`JobState`]s.
///
/// The `* -> Pending` edges model a retryable failure returning the job to
/// the queue state for a fresh pass; they are only taken while the attempt
/// ceiling has not been reached.
pub mod state_machine {
    use super::JobState;

    /// Returns the set of states reachable from `from`.
    ///
    /// Terminal states return an empty slice because no further transitions
    /// are allowed.
    pub fn valid_transitions(from: JobState) -> &'static [JobState] {
        use JobState::*;
        match from {
            Pending => &[Uploading, Failed],
            Uploading => &[Submitted, Pending, Failed],
            Submitted => &[Polling, Pending, Failed],
            Polling => &[Completed, Pending, Failed],
            Completed | Failed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: JobState, to: JobState) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition: {} -> {}",
                from.label(),
                to.label()
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// Classification of the most recent failure recorded on a job.
///
/// Retained even after eventual success for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The transport layer failed (connection, timeout, HTTP error).
    Transport { retryable: bool, message: String },
    /// The backend accepted the job but reported a generation failure.
    Backend { reason: String },
    /// A local precondition or filesystem operation failed; the backend
    /// was not at fault.
    Validation { message: String },
    /// The per-job deadline elapsed without a backend verdict.
    TimedOut,
    /// Cooperative cancellation ended the job.
    Cancelled,
}

impl FailureKind {
    /// Whether this failure is eligible for another submission attempt.
    ///
    /// Only transient transport faults and poll deadline expiries qualify;
    /// deterministic rejections are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::Transport {
                retryable: true,
                ..
            } | FailureKind::TimedOut
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport { retryable, message } => {
                let class = if *retryable { "retryable" } else { "terminal" };
                write!(f, "transport error ({class}): {message}")
            }
            FailureKind::Backend { reason } => write!(f, "backend rejected generation: {reason}"),
            FailureKind::Validation { message } => write!(f, "validation failed: {message}"),
            FailureKind::TimedOut => write!(f, "job deadline elapsed"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Immutable description of what a job should generate.
#[derive(Debug, Clone)]
pub struct JobInput {
    /// Display name used for logs and output naming.
    pub display_name: String,
    /// Path to the source asset on the local filesystem.
    pub source: PathBuf,
    /// Identifier of the workflow template to submit with the asset.
    pub template_id: String,
    /// Named generation parameters forwarded verbatim with the submission.
    pub params: serde_json::Value,
    /// Where the retrieved artifact will be written.
    pub output_path: PathBuf,
}

/// One tracked generation request.
///
/// Mutated only by the single worker currently processing it; the
/// transition methods keep the bookkeeping fields consistent with the
/// state machine.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input: JobInput,
    state: JobState,
    remote_handle: Option<String>,
    attempt: u32,
    last_error: Option<FailureKind>,
    result: Option<PathBuf>,
}

impl Job {
    /// Create a new job in the `Pending` state.
    pub fn new(id: JobId, input: JobInput) -> Self {
        Self {
            id,
            input,
            state: JobState::Pending,
            remote_handle: None,
            attempt: 0,
            last_error: None,
            result: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Backend-assigned identifier for the current submission, if any.
    pub fn remote_handle(&self) -> Option<&str> {
        self.remote_handle.as_deref()
    }

    /// 0-indexed count of submission attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Most recent failure, retained even after eventual success.
    pub fn last_error(&self) -> Option<&FailureKind> {
        self.last_error.as_ref()
    }

    /// Path of the retrieved artifact once `Completed`.
    pub fn result(&self) -> Option<&PathBuf> {
        self.result.as_ref()
    }

    fn set_state(&mut self, to: JobState) {
        debug_assert!(
            state_machine::can_transition(self.state, to),
            "invalid transition: {} -> {}",
            self.state.label(),
            to.label(),
        );
        self.state = to;
    }

    /// A worker started the upload step.
    pub fn mark_uploading(&mut self) {
        self.set_state(JobState::Uploading);
    }

    /// The backend accepted the submission and returned a handle.
    pub fn mark_submitted(&mut self, remote_handle: String) {
        self.set_state(JobState::Submitted);
        self.remote_handle = Some(remote_handle);
    }

    /// The worker entered the status poll loop.
    pub fn mark_polling(&mut self) {
        self.set_state(JobState::Polling);
    }

    /// The artifact was retrieved and written to `artifact`.
    pub fn mark_completed(&mut self, artifact: PathBuf) {
        self.set_state(JobState::Completed);
        self.result = Some(artifact);
    }

    /// Record a terminal failure.
    ///
    /// The remote handle, if any, is kept so the report can correlate the
    /// failure with the backend's records.
    pub fn mark_failed(&mut self, error: FailureKind) {
        self.set_state(JobState::Failed);
        self.last_error = Some(error);
    }

    /// Record a retryable failure and return the job to the queue state.
    ///
    /// Increments the attempt counter and discards the remote handle: the
    /// next pass performs a fresh upload and submission, never reusing
    /// stale status from a previous attempt.
    pub fn begin_retry(&mut self, error: FailureKind) {
        self.set_state(JobState::Pending);
        self.attempt += 1;
        self.last_error = Some(error);
        self.remote_handle = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
