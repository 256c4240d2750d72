// Background job queue for async submissions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::engine::Parameters;

pub mod channel;
pub mod worker;

pub use channel::{ChannelQueue, JobReceiver};
pub use worker::WorkerPool;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,

    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("workers did not finish within {timeout_secs}s")]
    ShutdownTimeout { timeout_secs: u64 },
}

/// Self-contained record of one async submission.
///
/// Delivery is at-least-once; tasks absorb duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowJob {
    pub job_id: Uuid,
    pub project_uuid: Uuid,
    pub flow_name: String,
    pub parameters: Parameters,
    pub audit_ref: Option<Uuid>,
    #[serde(default)]
    pub force_fail: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl FlowJob {
    pub fn new(project_uuid: Uuid, flow_name: &str, parameters: Parameters) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            project_uuid,
            flow_name: flow_name.to_string(),
            parameters,
            audit_ref: None,
            force_fail: false,
            enqueued_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Producer side of the background queue
#[cfg_attr(test, automock)]
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: &FlowJob) -> Result<(), QueueError>;

    /// Withdraw a job that has not been dequeued yet
    fn cancel(&self, job_id: &Uuid) -> Option<FlowJob>;

    /// Jobs enqueued and not yet dequeued or cancelled
    fn pending(&self) -> usize;

    /// Stop accepting jobs; already queued jobs are still delivered
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jobs_without_force_fail_decode() {
        let job = FlowJob::new(Uuid::new_v4(), "zone_create", Parameters::new());
        let mut value = serde_json::to_value(&job).unwrap();
        value.as_object_mut().unwrap().remove("force_fail");

        let decoded = FlowJob::decode(&value.to_string()).unwrap();
        assert!(!decoded.force_fail);
        assert_eq!(decoded.job_id, job.job_id);
    }

    #[test]
    fn parameters_survive_encoding() {
        let params = json!({"zone_uuid": "x", "colls": ["a", "b"], "n": null})
            .as_object()
            .cloned()
            .unwrap();
        let job = FlowJob::new(Uuid::new_v4(), "zone_create", params.clone());
        let decoded = FlowJob::decode(&job.encode().unwrap()).unwrap();
        assert_eq!(decoded.parameters, params);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(FlowJob::decode("{not json"), Err(QueueError::Encode(_))));
    }
}
