// Worker pool running dequeued jobs through the submission pipeline

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{FlowJob, JobReceiver, QueueError};
use crate::engine::{FlowError, FlowResult};
use crate::submission::TaskflowApi;

/// Unbounded pool: every dequeued job runs on its own tokio task
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<usize>,
}

impl WorkerPool {
    pub fn spawn(receiver: JobReceiver, api: Arc<TaskflowApi>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch(receiver, api, shutdown_rx));
        info!("Worker pool started");
        Self {
            shutdown,
            dispatcher,
        }
    }

    /// Stop dispatching, run jobs already queued, wait for in-flight jobs.
    /// Returns the number of jobs processed over the pool's lifetime.
    pub async fn shutdown(self, timeout: Duration) -> Result<usize, QueueError> {
        info!(timeout_secs = timeout.as_secs(), "Shutting down worker pool");
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(timeout, self.dispatcher).await {
            Ok(Ok(processed)) => {
                info!(processed, "Worker pool stopped");
                Ok(processed)
            }
            Ok(Err(join_error)) => {
                error!(error = %join_error, "Worker dispatcher aborted");
                Ok(0)
            }
            Err(_) => {
                warn!("Worker pool did not stop in time");
                Err(QueueError::ShutdownTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

fn start(in_flight: &mut JoinSet<Result<FlowResult, FlowError>>, api: &Arc<TaskflowApi>, job: FlowJob) {
    debug!(job_id = %job.job_id, flow = %job.flow_name, "Dispatching job");
    let api = api.clone();
    in_flight.spawn(async move { api.run_job(job).await });
}

fn finished(result: Result<Result<FlowResult, FlowError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(result)) => debug!(flow = %result.flow_name, "Job finished"),
        // Already reported to the audit trail by the submission pipeline
        Ok(Err(e)) => debug!(error = %e, "Job failed"),
        Err(join_error) => error!(error = %join_error, "Job worker aborted"),
    }
}

async fn dispatch(
    mut receiver: JobReceiver,
    api: Arc<TaskflowApi>,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut in_flight = JoinSet::new();
    let mut processed = 0usize;

    loop {
        tokio::select! {
            job = receiver.next_job() => match job {
                Some(job) => start(&mut in_flight, &api, job),
                None => break,
            },
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                finished(result);
                processed += 1;
            }
            _ = shutdown.changed() => break,
        }
    }

    while let Some(job) = receiver.try_next_job() {
        start(&mut in_flight, &api, job);
    }
    while let Some(result) = in_flight.join_next().await {
        finished(result);
        processed += 1;
    }
    processed
}
