use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::str_param;
use crate::engine::{Flow, FlowError, FlowInit, FlowSpec, Parameters, TaskList};
use crate::storage::{AccessLevel, CreateUserTask, SetAccessTask, UserKind};

pub const NAME: &str = "role_update";

/// Sets a user's access on the whole project. `access: null` removes it.
pub struct RoleUpdateFlow {
    init: FlowInit,
    spec: FlowSpec,
}

impl RoleUpdateFlow {
    pub fn new(init: FlowInit) -> Self {
        Self {
            init,
            spec: FlowSpec::new().require(&["username"]).lock(true),
        }
    }

    /// `access` must be present; an explicit null means "no access"
    fn access(&self) -> Result<AccessLevel, FlowError> {
        match self.init.parameters.get("access") {
            None => Err(FlowError::MissingField {
                field: "access".to_string(),
            }),
            Some(Value::Null) => Ok(AccessLevel::Null),
            Some(Value::String(raw)) => {
                raw.parse()
                    .map_err(|reason: String| FlowError::InvalidParameter {
                        field: "access".to_string(),
                        reason,
                    })
            }
            Some(_) => Err(FlowError::InvalidParameter {
                field: "access".to_string(),
                reason: "expected a string or null".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Flow for RoleUpdateFlow {
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
        str_param(&self.init.parameters, "username")?;
        self.access()?;
        Ok(())
    }

    async fn build_tasks(&self, tasks: &mut TaskList) -> Result<()> {
        let services = &self.init.services;
        let username = str_param(&self.init.parameters, "username")?;
        let access = self.access()?;

        let project_path = services.paths.project_path(&self.init.project_uuid);
        if !services.storage.collection_exists(&project_path).await? {
            bail!("Project collection not found: {project_path}");
        }

        tasks.add(CreateUserTask::new(
            &format!("Create user \"{username}\""),
            services.storage.clone(),
            username,
            UserKind::User,
        ));
        tasks.add(
            SetAccessTask::new(
                &format!("Set {access} access for user \"{username}\" on project"),
                services.storage.clone(),
                &project_path,
                username,
                access,
            )
            .recursive(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mocks::test_init;
    use crate::engine::Mode;
    use serde_json::json;

    fn flow(params: serde_json::Value) -> RoleUpdateFlow {
        RoleUpdateFlow::new(FlowInit {
            parameters: params.as_object().cloned().unwrap(),
            ..test_init(NAME)
        })
    }

    #[test]
    fn null_access_is_accepted() {
        let flow = flow(json!({"username": "bob", "access": null}));
        assert!(flow.validate(Mode::Async).is_ok());
        assert_eq!(flow.access().unwrap(), AccessLevel::Null);
    }

    #[test]
    fn absent_access_is_missing() {
        let flow = flow(json!({"username": "bob"}));
        assert!(matches!(
            flow.validate(Mode::Sync),
            Err(FlowError::MissingField { ref field }) if field == "access"
        ));
    }

    #[test]
    fn unknown_access_level_is_invalid() {
        let flow = flow(json!({"username": "bob", "access": "admin"}));
        assert!(matches!(
            flow.validate(Mode::Sync),
            Err(FlowError::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn missing_project_collection_fails_build() {
        let flow = flow(json!({"username": "bob", "access": "read"}));
        let err = flow.build(false).await.unwrap_err();
        assert!(err.to_string().contains("Project collection not found"));
    }
}
