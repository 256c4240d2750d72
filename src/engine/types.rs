// Core value types shared by flows, the executor and the submission API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Flow parameters. Always JSON-serializable so they can cross the queue.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Execution mode of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Run inline and return the terminal result to the caller
    Sync,
    /// Queue a job and return immediately
    Async,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Async => "async",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(Mode::Sync),
            "async" => Ok(Mode::Async),
            other => Err(format!("Unknown execution mode: {other}")),
        }
    }
}

/// Per-task outcome within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    NotRun,
    Executed,
    /// `execute()` was attempted and returned an error
    Failed,
    Reverted,
    RevertFailed,
}

/// Execution record of a single task
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: TaskStatus::NotRun,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A compensating action that failed. Logged, never surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RevertFailure {
    pub task: String,
    pub message: String,
}

/// What happened to each task of a run, in build order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub records: Vec<TaskRecord>,
    /// Task names in the order their revert was invoked
    pub revert_order: Vec<String>,
    pub revert_failures: Vec<RevertFailure>,
}

impl RunReport {
    pub fn executed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    TaskStatus::Executed | TaskStatus::Reverted | TaskStatus::RevertFailed
                )
            })
            .count()
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.records.iter().find(|r| r.name == task).map(|r| r.status)
    }

    pub fn rolled_back(&self) -> bool {
        !self.revert_order.is_empty()
    }
}

/// Successful terminal result of a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowResult {
    pub flow_name: String,
    pub project_uuid: Uuid,
    pub mode: Mode,
    pub tasks_executed: usize,
    pub duration_ms: u64,
}

/// Caller-visible result of `TaskflowApi::submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Sync submission ran to success
    Completed(FlowResult),
    /// Async submission was queued; the outcome goes to the audit entry
    Queued { job_id: Uuid },
}

impl SubmitOutcome {
    pub fn result(&self) -> Option<&FlowResult> {
        match self {
            SubmitOutcome::Completed(result) => Some(result),
            SubmitOutcome::Queued { .. } => None,
        }
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            SubmitOutcome::Completed(_) => None,
            SubmitOutcome::Queued { job_id } => Some(*job_id),
        }
    }
}
