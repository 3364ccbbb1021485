//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every stage succeeded
    Succeeded,
    /// At least one stage did not succeed
    Failed,
}

/// Why a stage ended up `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The stage ran and reported failure (non-zero exit)
    ExitFailure,
    /// The scheduler could not run the stage at all
    DispatchFault(String),
    /// The active backend has no descriptor for this stage
    BackendMismatch,
    /// The stage exceeded the configured wall-clock limit
    Timeout { after: Duration },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitFailure => f.write_str("stage reported failure"),
            FailureReason::DispatchFault(msg) => write!(f, "dispatch fault: {}", msg),
            FailureReason::BackendMismatch => f.write_str("backend mismatch"),
            FailureReason::Timeout { after } => write!(f, "timed out after {:?}", after),
        }
    }
}

/// Why a stage ended up `Skipped`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// A stage this one transitively depends on failed
    AncestorFailed { ancestor: String },
    /// The run was cancelled before this stage was dispatched
    Cancelled,
    /// The active backend has no descriptor for this stage
    BackendMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AncestorFailed { ancestor } => write!(f, "ancestor '{}' failed", ancestor),
            SkipReason::Cancelled => f.write_str("run cancelled"),
            SkipReason::BackendMismatch => f.write_str("not applicable for this backend"),
        }
    }
}

/// State of a single stage within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    /// Waiting for producing stages
    Pending,
    /// All inputs available, not yet dispatched
    Ready,
    /// Dispatched to a scheduler
    Running { started_at: DateTime<Utc> },
    /// Stage completed successfully
    Succeeded {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Stage did not succeed
    Failed {
        reason: FailureReason,
        started_at: Option<DateTime<Utc>>,
        failed_at: DateTime<Utc>,
    },
    /// Stage was never dispatched
    Skipped { reason: SkipReason },
}

impl StageState {
    /// Check if stage is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Succeeded { .. } | StageState::Failed { .. } | StageState::Skipped { .. }
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, StageState::Succeeded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageState::Pending => "PENDING",
            StageState::Ready => "READY",
            StageState::Running { .. } => "RUNNING",
            StageState::Succeeded { .. } => "SUCCEEDED",
            StageState::Failed { .. } => "FAILED",
            StageState::Skipped { .. } => "SKIPPED",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Failed { reason, .. } => write!(f, "{} ({})", self.label(), reason),
            StageState::Skipped { reason } => write!(f, "{} ({})", self.label(), reason),
            _ => f.write_str(self.label()),
        }
    }
}

/// Final state of one stage, in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub name: String,
    pub state: StageState,
}

/// Result of an orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run ID
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub status: RunStatus,

    /// Per-stage terminal states in declaration order
    pub stages: Vec<StageOutcome>,

    /// Whether the run was cancelled
    pub cancelled: bool,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Terminal state of a stage
    pub fn state_of(&self, stage: &str) -> Option<&StageState> {
        self.stages.iter().find(|s| s.name == stage).map(|s| &s.state)
    }

    /// Every stage that did not succeed
    pub fn non_succeeded(&self) -> Vec<&StageOutcome> {
        self.stages.iter().filter(|s| !s.state.is_succeeded()).collect()
    }

    /// Names of failed stages
    pub fn failed(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, StageState::Failed { .. }))
    }

    /// Names of skipped stages
    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, StageState::Skipped { .. }))
    }

    /// Names of succeeded stages
    pub fn succeeded(&self) -> Vec<&str> {
        self.names_where(StageState::is_succeeded)
    }

    fn names_where(&self, pred: impl Fn(&StageState) -> bool) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| pred(&s.state))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// One line per non-succeeded stage
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} {:?}: {}/{} stages succeeded",
            self.pipeline_name,
            self.status,
            self.succeeded().len(),
            self.stages.len()
        );
        for outcome in self.non_succeeded() {
            out.push_str(&format!("\n  {}: {}", outcome.name, outcome.state));
        }
        out
    }

    /// Exit code for a command-line caller
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
