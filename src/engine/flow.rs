// Flow abstraction: validated parameters turned into an ordered task chain

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::FlowError;
use super::reporting::DomainTarget;
use super::task::TaskList;
use super::types::{Mode, Parameters};
use crate::domain::zones::ZoneRepository;
use crate::storage::{StorageBackend, StoragePaths};

/// Static properties of a flow type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSpec {
    pub required_fields: Vec<String>,
    pub supported_modes: Vec<Mode>,
    pub require_lock: bool,
}

impl Default for FlowSpec {
    fn default() -> Self {
        Self {
            required_fields: Vec::new(),
            supported_modes: vec![Mode::Sync, Mode::Async],
            require_lock: true,
        }
    }
}

impl FlowSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, fields: &[&str]) -> Self {
        self.required_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn modes(mut self, modes: &[Mode]) -> Self {
        self.supported_modes = modes.to_vec();
        self
    }

    pub fn lock(mut self, require_lock: bool) -> Self {
        self.require_lock = require_lock;
        self
    }

    /// First required field absent (or null) in `parameters`
    pub fn first_missing_field(&self, parameters: &Parameters) -> Option<&str> {
        self.required_fields
            .iter()
            .find(|field| parameters.get(field.as_str()).is_none_or(|v| v.is_null()))
            .map(|field| field.as_str())
    }
}

/// Collaborators available to flows while building their task chain
#[derive(Clone)]
pub struct FlowServices {
    pub storage: Arc<dyn StorageBackend>,
    pub zones: Arc<dyn ZoneRepository>,
    pub paths: StoragePaths,
}

/// Everything a flow constructor receives for one submission
#[derive(Clone)]
pub struct FlowInit {
    pub project_uuid: Uuid,
    pub flow_name: String,
    pub parameters: Parameters,
    pub mode: Mode,
    pub services: FlowServices,
}

/// One logical change, expressed as an ordered chain of tasks.
///
/// `build` must not mutate anything outside the returned task list: it only
/// reads parameters and looks up referenced domain objects.
#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &str;

    fn project_uuid(&self) -> Uuid;

    fn parameters(&self) -> &Parameters;

    fn spec(&self) -> &FlowSpec;

    /// Flow-specific parameter checks, run after the required-field check
    fn validate_parameters(&self) -> Result<(), FlowError> {
        Ok(())
    }

    /// Reject missing fields and unsupported modes before any side effect
    fn validate(&self, mode: Mode) -> Result<(), FlowError> {
        let spec = self.spec();
        if let Some(field) = spec.first_missing_field(self.parameters()) {
            return Err(FlowError::MissingField {
                field: field.to_string(),
            });
        }
        if !spec.supported_modes.contains(&mode) {
            return Err(FlowError::UnsupportedMode {
                flow: self.name().to_string(),
                mode,
            });
        }
        self.validate_parameters()
    }

    /// Domain object whose terminal status this flow sets, if any
    async fn domain_target(&self) -> Option<DomainTarget> {
        None
    }

    /// Append this flow's tasks in execution order
    async fn build_tasks(&self, tasks: &mut TaskList) -> anyhow::Result<()>;

    /// Build the task chain; `force_fail` makes the last task fail
    async fn build(&self, force_fail: bool) -> Result<TaskList, FlowError> {
        let mut tasks = TaskList::new();
        self.build_tasks(&mut tasks)
            .await
            .map_err(|e| FlowError::Build {
                message: format!("{e:#}"),
            })?;
        if force_fail {
            tasks.force_fail_last();
        }
        Ok(tasks)
    }
}
