// Test doubles for the engine - record calls, no external side effects

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::flow::{Flow, FlowInit, FlowServices, FlowSpec};
use super::task::{Task, TaskContext, TaskList};
use super::types::{Mode, Parameters};
use crate::config::StorageConfig;
use crate::domain::zones::MemoryZoneRepository;
use crate::storage::{MemoryStorage, StoragePaths};

/// Shared, ordered log of task calls (`execute:<name>`, `revert:<name>`)
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

/// Task that only records what happened to it
pub struct RecordingTask {
    name: String,
    log: EventLog,
    fail_execute: bool,
    fail_revert: bool,
    panic_execute: bool,
    capture_failure: bool,
}

impl RecordingTask {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_execute: false,
            fail_revert: false,
            panic_execute: false,
            capture_failure: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn failing_revert(mut self) -> Self {
        self.fail_revert = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_execute = true;
        self
    }

    /// Log `failure:<message>` when reverted
    pub fn capturing_failure(mut self) -> Self {
        self.capture_failure = true;
        self
    }
}

#[async_trait]
impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        if self.panic_execute {
            panic!("task {} panicked", self.name);
        }
        if self.fail_execute {
            bail!("injected failure in {}", self.name);
        }
        self.log.push(format!("execute:{}", self.name));
        Ok(())
    }

    async fn revert(&mut self, ctx: &TaskContext) -> Result<()> {
        self.log.push(format!("revert:{}", self.name));
        if self.capture_failure {
            self.log
                .push(format!("failure:{}", ctx.failure().unwrap_or_default()));
        }
        if self.fail_revert {
            return Err(anyhow!("injected revert failure in {}", self.name));
        }
        Ok(())
    }
}

/// Flow whose chain is a fixed list of recording tasks
pub struct StaticFlow {
    name: String,
    project_uuid: Uuid,
    spec: FlowSpec,
    parameters: Parameters,
    log: EventLog,
    task_names: Vec<String>,
    fail_build: bool,
}

impl StaticFlow {
    pub fn new(
        name: &str,
        spec: FlowSpec,
        parameters: Parameters,
        log: &EventLog,
        task_names: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            project_uuid: Uuid::new_v4(),
            spec,
            parameters,
            log: log.clone(),
            task_names: task_names.iter().map(|n| n.to_string()).collect(),
            fail_build: false,
        }
    }

    pub fn with_project(mut self, project_uuid: Uuid) -> Self {
        self.project_uuid = project_uuid;
        self
    }

    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }
}

#[async_trait]
impl Flow for StaticFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn project_uuid(&self) -> Uuid {
        self.project_uuid
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    async fn build_tasks(&self, tasks: &mut TaskList) -> Result<()> {
        if self.fail_build {
            bail!("referenced object does not exist");
        }
        for name in &self.task_names {
            tasks.add(RecordingTask::new(name, &self.log));
        }
        Ok(())
    }
}

pub fn test_services() -> FlowServices {
    FlowServices {
        storage: Arc::new(MemoryStorage::new()),
        zones: Arc::new(MemoryZoneRepository::new()),
        paths: StoragePaths::from_config(&StorageConfig::default()),
    }
}

pub fn test_init(flow_name: &str) -> FlowInit {
    FlowInit {
        project_uuid: Uuid::new_v4(),
        flow_name: flow_name.to_string(),
        parameters: Parameters::new(),
        mode: Mode::Sync,
        services: test_services(),
    }
}
