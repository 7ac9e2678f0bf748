//! Run report returned by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::{ComparisonEntry, SampleEntry, StepResult, VerificationEntry};

/// Lifecycle of one orchestrator invocation.
///
/// `Pending -> Running -> {Succeeded, Failed}`. There is no retrying state;
/// a failed run is re-invoked from scratch by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate result of one pipeline run.
///
/// `verification`, `comparison` and `samples` are `Some` exactly when
/// `all_succeeded` is true. Steps after a failure are absent from `steps`
/// rather than recorded as skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline: String,

    pub state: RunState,

    /// Number of steps the pipeline declared, attempted or not.
    pub total_steps: usize,

    pub steps: Vec<StepResult>,

    pub all_succeeded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Vec<VerificationEntry>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Vec<ComparisonEntry>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<SampleEntry>>,

    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub(crate) fn new(pipeline: impl Into<String>, total_steps: usize) -> Self {
        Self {
            pipeline: pipeline.into(),
            state: RunState::Pending,
            total_steps,
            steps: Vec::with_capacity(total_steps),
            all_succeeded: false,
            verification: None,
            comparison: None,
            samples: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// The step that stopped the run, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|r| !r.succeeded)
    }

    /// Failed plus never-attempted steps.
    pub fn unsuccessful_step_count(&self) -> usize {
        let succeeded = self.steps.iter().filter(|r| r.succeeded).count();
        self.total_steps.saturating_sub(succeeded)
    }

    /// Steps that were never attempted because of an earlier failure.
    pub fn unexecuted_step_count(&self) -> usize {
        self.total_steps.saturating_sub(self.steps.len())
    }

    pub fn total_bytes_processed(&self) -> u64 {
        self.steps.iter().filter_map(|r| r.bytes_processed).sum()
    }

    pub fn total_bytes_billed(&self) -> u64 {
        self.steps.iter().filter_map(|r| r.bytes_billed).sum()
    }

    /// Process exit status for this run: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded {
            0
        } else {
            1
        }
    }

    /// Wall-clock duration, once the run has finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
