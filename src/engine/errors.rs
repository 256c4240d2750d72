use thiserror::Error;
use uuid::Uuid;

use super::types::Mode;
use crate::lock::LockError;
use crate::queue::QueueError;

/// Generic message used when a run ends without a result or an error
pub const UNKNOWN_RUN_ERROR: &str = "Running flow failed: unknown error, see server log";

/// Default bound applied to failure messages shown to users
pub const DEFAULT_MESSAGE_LIMIT: usize = 256;

/// Errors surfaced by flow submission and execution
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Error validating flow: missing required field \"{field}\"")]
    MissingField { field: String },

    #[error("Error validating flow: invalid parameter \"{field}\": {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Error validating flow: mode \"{mode}\" not supported by flow \"{flow}\"")]
    UnsupportedMode { flow: String, mode: Mode },

    #[error("Flow \"{name}\" not supported")]
    UnknownFlow { name: String },

    #[error("Flow \"{name}\" is already registered")]
    DuplicateFlow { name: String },

    #[error("Unable to acquire project lock: {0}")]
    Lock(#[from] LockError),

    #[error("Error building flow: {message}")]
    Build { message: String },

    #[error("Error running flow: task \"{task}\" failed: {message}")]
    TaskExecution { task: String, message: String },

    #[error("{}", UNKNOWN_RUN_ERROR)]
    Unknown,

    #[error("Job {job_id} cancelled before execution")]
    Cancelled { job_id: Uuid },

    #[error("Flow parameters are not serializable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unable to queue flow: {0}")]
    Queue(#[from] QueueError),

    #[error("Improperly configured: {reason}")]
    ImproperlyConfigured { reason: String },

    #[error("Storage operation failed: {0}")]
    Storage(anyhow::Error),
}

impl FlowError {
    /// Short category name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::MissingField { .. }
            | FlowError::InvalidParameter { .. }
            | FlowError::UnsupportedMode { .. } => "validation",
            FlowError::UnknownFlow { .. } | FlowError::DuplicateFlow { .. } => "registry",
            FlowError::Lock(_) => "lock",
            FlowError::Build { .. } => "build",
            FlowError::TaskExecution { .. } => "task_execution",
            FlowError::Unknown => "unknown",
            FlowError::Cancelled { .. } => "cancelled",
            FlowError::Serialization(_) => "serialization",
            FlowError::Queue(_) => "queue",
            FlowError::ImproperlyConfigured { .. } => "configuration",
            FlowError::Storage(_) => "storage",
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == "validation"
    }

    /// True when the error happened before any task could have run
    pub fn before_side_effects(&self) -> bool {
        !matches!(self, FlowError::TaskExecution { .. } | FlowError::Unknown)
    }

    /// Human readable message bounded to `limit` characters
    pub fn bounded_message(&self, limit: usize) -> String {
        truncate_message(&self.to_string(), limit)
    }
}

/// Cut a message to at most `limit` characters on a char boundary
pub fn truncate_message(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
