use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};
use uuid::Uuid;

use super::{FlowJob, JobQueue, QueueError};

type PendingJobs = Arc<Mutex<HashMap<Uuid, FlowJob>>>;

/// In-process queue: JSON-encoded jobs over an unbounded channel
pub struct ChannelQueue {
    sender: Mutex<Option<UnboundedSender<String>>>,
    pending: PendingJobs,
}

/// Consumer side of a `ChannelQueue`
pub struct JobReceiver {
    receiver: UnboundedReceiver<String>,
    pending: PendingJobs,
}

impl ChannelQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending: PendingJobs = Arc::default();
        (
            Self {
                sender: Mutex::new(Some(sender)),
                pending: pending.clone(),
            },
            JobReceiver { receiver, pending },
        )
    }
}

impl JobQueue for ChannelQueue {
    fn enqueue(&self, job: &FlowJob) -> Result<(), QueueError> {
        let raw = job.encode()?;
        let sender = self.sender.lock().map_err(|_| QueueError::Closed)?;
        let sender = sender.as_ref().ok_or(QueueError::Closed)?;

        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(job.job_id, job.clone());
        }
        if sender.send(raw).is_err() {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&job.job_id);
            }
            return Err(QueueError::Closed);
        }
        debug!(job_id = %job.job_id, flow = %job.flow_name, "Job enqueued");
        Ok(())
    }

    fn cancel(&self, job_id: &Uuid) -> Option<FlowJob> {
        self.pending.lock().ok()?.remove(job_id)
    }

    fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

impl JobReceiver {
    /// Claim a decoded job, skipping cancelled ones
    fn claim(&self, raw: &str) -> Option<FlowJob> {
        let job = match FlowJob::decode(raw) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Dropping undecodable job");
                return None;
            }
        };
        let claimed = self
            .pending
            .lock()
            .map(|mut p| p.remove(&job.job_id).is_some())
            .unwrap_or(false);
        if !claimed {
            debug!(job_id = %job.job_id, "Skipping cancelled job");
            return None;
        }
        Some(job)
    }

    /// Wait for the next job. Returns None once the queue is closed and empty.
    pub async fn next_job(&mut self) -> Option<FlowJob> {
        loop {
            let raw = self.receiver.recv().await?;
            if let Some(job) = self.claim(&raw) {
                return Some(job);
            }
        }
    }

    /// Next already-queued job, without waiting
    pub fn try_next_job(&mut self) -> Option<FlowJob> {
        loop {
            let raw = match self.receiver.try_recv() {
                Ok(raw) => raw,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };
            if let Some(job) = self.claim(&raw) {
                return Some(job);
            }
        }
    }
}
