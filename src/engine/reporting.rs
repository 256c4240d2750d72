// Terminal status reporting to the audit trail and the addressed domain object

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use super::errors::{truncate_message, FlowError};
use super::types::{FlowResult, Mode};
use crate::domain::timeline::{Timeline, TimelineStatus};

/// Status setter of an external stateful object. States are opaque to the engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusTarget: Send + Sync {
    async fn set_status(&self, state: &str, message: &str) -> Result<()>;
}

/// Domain object addressed by a flow, with the state it takes on failure
#[derive(Clone)]
pub struct DomainTarget {
    pub label: String,
    pub target: Arc<dyn StatusTarget>,
    pub failure_state: String,
}

impl DomainTarget {
    pub fn new(label: impl Into<String>, target: Arc<dyn StatusTarget>, failure_state: &str) -> Self {
        Self {
            label: label.into(),
            target,
            failure_state: failure_state.to_string(),
        }
    }
}

/// Write-once status sink shared by the flow's tasks and the terminal reporter.
///
/// The first status successfully written wins; later writes are dropped.
/// A write the target rejects does not count.
pub struct DomainStatus {
    target: DomainTarget,
    message_limit: usize,
    written: AtomicBool,
}

impl DomainStatus {
    pub fn new(target: DomainTarget, message_limit: usize) -> Self {
        Self {
            target,
            message_limit,
            written: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> &str {
        &self.target.label
    }

    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::SeqCst)
    }

    /// Set the terminal status. Returns false if a status was already written.
    pub async fn set(&self, state: &str, message: &str) -> Result<bool> {
        if self.written.swap(true, Ordering::SeqCst) {
            debug!(
                target_label = %self.target.label,
                state = state,
                "Terminal status already written, ignoring"
            );
            return Ok(false);
        }
        let message = truncate_message(message, self.message_limit);
        if let Err(e) = self.target.target.set_status(state, &message).await {
            // Not written: leave the slot open for the next writer
            self.written.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(true)
    }

    /// Set the flow's failure state unless a terminal status already exists
    pub async fn fail(&self, message: &str) -> Result<bool> {
        let state = self.target.failure_state.clone();
        self.set(&state, message).await
    }
}

/// Writes the single terminal report of one submission.
///
/// `report` consumes the reporter so a submission cannot report twice.
pub struct TerminalReporter {
    timeline: Arc<dyn Timeline>,
    audit_ref: Option<Uuid>,
    domain: Option<Arc<DomainStatus>>,
    mode: Mode,
    message_limit: usize,
}

impl TerminalReporter {
    pub fn new(
        timeline: Arc<dyn Timeline>,
        audit_ref: Option<Uuid>,
        domain: Option<Arc<DomainStatus>>,
        mode: Mode,
        message_limit: usize,
    ) -> Self {
        Self {
            timeline,
            audit_ref,
            domain,
            mode,
            message_limit,
        }
    }

    pub async fn report(self, outcome: &Result<FlowResult, FlowError>) {
        match outcome {
            Ok(result) => self.report_success(result).await,
            Err(err) => self.report_failure(err).await,
        }
    }

    async fn report_success(self, result: &FlowResult) {
        if let Some(domain) = &self.domain {
            if !domain.is_written() {
                warn!(
                    flow = %result.flow_name,
                    target_label = %domain.label(),
                    "Flow succeeded without setting a terminal domain status"
                );
            }
        }
        let message = match self.mode {
            Mode::Sync => "Sync submit OK",
            Mode::Async => "Async submit OK",
        };
        self.write_audit(TimelineStatus::Ok, message).await;
    }

    pub async fn report_failure(self, err: &FlowError) {
        let message = err.bounded_message(self.message_limit);
        if let Some(domain) = &self.domain {
            if let Err(e) = domain.fail(&message).await {
                error!(target_label = %domain.label(), error = %e, "Failed to set domain failure status");
            }
        }
        self.write_audit(TimelineStatus::Failed, &message).await;
    }

    async fn write_audit(&self, status: TimelineStatus, message: &str) {
        let Some(event) = self.audit_ref else {
            return;
        };
        if let Err(e) = self.timeline.set_status(event, status, message).await {
            error!(event = %event, status = %status, error = %e, "Failed to update timeline event");
        }
    }
}
