// Task abstraction: one external mutation paired with its compensation

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::reporting::DomainStatus;

/// Text injected by `force_fail`, visible in the resulting failure message
pub const FORCED_FAILURE_MESSAGE: &str = "Forced failure for testing";

/// Per-submission context handed to every task
#[derive(Clone)]
pub struct TaskContext {
    pub flow_name: String,
    pub project_uuid: Uuid,
    pub correlation_id: String,
    failure: Option<String>,
    domain: Option<Arc<DomainStatus>>,
}

impl TaskContext {
    pub fn new(flow_name: &str, project_uuid: Uuid, correlation_id: &str) -> Self {
        Self {
            flow_name: flow_name.to_string(),
            project_uuid,
            correlation_id: correlation_id.to_string(),
            failure: None,
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: Option<Arc<DomainStatus>>) -> Self {
        self.domain = domain;
        self
    }

    /// Status sink of the domain object addressed by this submission
    pub fn domain(&self) -> Option<&Arc<DomainStatus>> {
        self.domain.as_ref()
    }

    /// Message of the failure being compensated, set before reverts run
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn set_failure(&mut self, message: String) {
        self.failure = Some(message);
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("flow_name", &self.flow_name)
            .field("project_uuid", &self.project_uuid)
            .field("correlation_id", &self.correlation_id)
            .field("failure", &self.failure)
            .field("has_domain", &self.domain.is_some())
            .finish()
    }
}

/// One atomic external mutation.
///
/// `revert` must be a no-op when `execute` never completed and its errors are
/// only recorded by the executor, never returned in place of the original
/// failure. Implementations should tolerate repeated execution since background
/// jobs may be delivered more than once.
#[async_trait]
pub trait Task: Send {
    fn name(&self) -> &str;

    async fn execute(&mut self, ctx: &TaskContext) -> Result<()>;

    async fn revert(&mut self, ctx: &TaskContext) -> Result<()>;
}

/// Replaces a task's execution with an injected failure
pub struct ForcedFailure {
    inner: Box<dyn Task>,
}

impl ForcedFailure {
    pub fn wrap(inner: Box<dyn Task>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Task for ForcedFailure {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        bail!("{} ({})", FORCED_FAILURE_MESSAGE, self.inner.name())
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }
}

/// Ordered task chain produced by `Flow::build`
#[derive(Default)]
pub struct TaskList {
    tasks: Vec<Box<dyn Task>>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: Task + 'static>(&mut self, task: T) {
        self.tasks.push(Box::new(task));
    }

    pub fn add_boxed(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    /// Make the last task fail instead of executing
    pub fn force_fail_last(&mut self) {
        if let Some(last) = self.tasks.pop() {
            self.tasks.push(Box::new(ForcedFailure::wrap(last)));
        }
    }

    pub(crate) fn into_inner(self) -> Vec<Box<dyn Task>> {
        self.tasks
    }
}

impl std::fmt::Debug for TaskList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
