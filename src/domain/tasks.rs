// Tasks that write the terminal status of the flow's domain object

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::engine::task::{Task, TaskContext};

/// Sets the success status as the final step of a flow
pub struct SetDomainStatusTask {
    name: String,
    state: String,
    message: String,
}

impl SetDomainStatusTask {
    pub fn new(name: &str, state: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            state: state.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Task for SetDomainStatusTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<()> {
        match ctx.domain() {
            Some(domain) => {
                domain.set(&self.state, &self.message).await?;
            }
            None => warn!(task = %self.name, "No domain object to set status on"),
        }
        Ok(())
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }
}

/// First task of a flow: on compensation, records the failure on the domain object
pub struct RevertDomainStatusTask {
    name: String,
    state: String,
    prefix: String,
}

impl RevertDomainStatusTask {
    pub fn new(name: &str, state: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            state: state.to_string(),
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl Task for RevertDomainStatusTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }

    async fn revert(&mut self, ctx: &TaskContext) -> Result<()> {
        let Some(domain) = ctx.domain() else {
            return Ok(());
        };
        let message = format!(
            "{}: {}",
            self.prefix,
            ctx.failure().unwrap_or("unknown error")
        );
        domain.set(&self.state, &message).await?;
        Ok(())
    }
}
