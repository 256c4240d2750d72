use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::{opt_str_param, str_param};
use crate::engine::{Flow, FlowError, FlowInit, FlowSpec, Mode, Parameters, TaskList};
use crate::storage::{
    AccessLevel, CreateCollectionTask, CreateUserTask, SetAccessTask, SetMetadataTask, UserKind,
};

pub const NAME: &str = "project_create";

/// Creates the project collection, its user group and optional owner
pub struct ProjectCreateFlow {
    init: FlowInit,
    spec: FlowSpec,
}

impl ProjectCreateFlow {
    pub fn new(init: FlowInit) -> Self {
        Self {
            init,
            spec: FlowSpec::new()
                .require(&["title"])
                .modes(&[Mode::Sync])
                .lock(true),
        }
    }
}

#[async_trait]
impl Flow for ProjectCreateFlow {
    fn name(&self) -> &str {
        &self.init.flow_name
    }

    fn project_uuid(&self) -> Uuid {
        self.init.project_uuid
    }

    fn parameters(&self) -> &Parameters {
        &self.init.parameters
    }

    fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    fn validate_parameters(&self) -> Result<(), FlowError> {
        let title = str_param(&self.init.parameters, "title")?;
        if title.trim().is_empty() {
            return Err(FlowError::InvalidParameter {
                field: "title".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        opt_str_param(&self.init.parameters, "description")?;
        opt_str_param(&self.init.parameters, "owner")?;
        Ok(())
    }

    async fn build_tasks(&self, tasks: &mut TaskList) -> Result<()> {
        let params = &self.init.parameters;
        let services = &self.init.services;
        let storage = services.storage.clone();

        let title = str_param(params, "title")?;
        let description = opt_str_param(params, "description")?;
        let owner = opt_str_param(params, "owner")?;

        let project_path = services.paths.project_path(&self.init.project_uuid);
        let group = services.paths.user_group_name(&self.init.project_uuid);

        tasks.add(CreateCollectionTask::new(
            "Create collection for project",
            storage.clone(),
            &project_path,
        ));
        tasks.add(SetMetadataTask::new(
            "Add title metadata to project",
            storage.clone(),
            &project_path,
            "title",
            title,
        ));
        if let Some(description) = description {
            tasks.add(SetMetadataTask::new(
                "Add description metadata to project",
                storage.clone(),
                &project_path,
                "description",
                description,
            ));
        }
        tasks.add(CreateUserTask::new(
            "Create user group for project",
            storage.clone(),
            &group,
            UserKind::Group,
        ));
        tasks.add(
            SetAccessTask::new(
                "Set user group read access for project",
                storage.clone(),
                &project_path,
                &group,
                AccessLevel::Read,
            )
            .recursive(),
        );
        if let Some(owner) = owner {
            tasks.add(CreateUserTask::new(
                &format!("Create user \"{owner}\" for project owner"),
                storage.clone(),
                owner,
                UserKind::User,
            ));
            tasks.add(
                SetAccessTask::new(
                    &format!("Set owner \"{owner}\" access for project"),
                    storage,
                    &project_path,
                    owner,
                    AccessLevel::Own,
                )
                .recursive(),
            );
        }
        Ok(())
    }
}
