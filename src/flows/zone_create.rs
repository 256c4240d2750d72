// Landing zone creation

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

use super::{opt_str_param, str_list_param, uuid_param};
use crate::domain::tasks::{RevertDomainStatusTask, SetDomainStatusTask};
use crate::domain::zones::{ZoneStatus, ZoneStatusTarget};
use crate::engine::{DomainTarget, Flow, FlowError, FlowInit, FlowSpec, Parameters, TaskList};
use crate::storage::paths::join;
use crate::storage::{
    AccessLevel, CreateCollectionTask, CreateUserTask, SetAccessTask, SetInheritanceTask,
    SetMetadataTask, UserKind,
};

pub const NAME: &str = "zone_create";

pub const ACTIVE_MESSAGE: &str = "Available with write access for user";
pub const FAILURE_PREFIX: &str = "Failed to create landing zone";

static COLLECTION_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").ok());

fn check_collection_name(name: &str) -> Result<()> {
    let valid = COLLECTION_NAME
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name));
    if name == "." || name == ".." || !valid {
        bail!("Invalid collection name: \"{name}\"");
    }
    Ok(())
}

/// Creates a landing zone and its requested collections, then marks it ACTIVE.
///
/// Runs without the project lock.
pub struct ZoneCreateFlow {
    init: FlowInit,
    spec: FlowSpec,
}

impl ZoneCreateFlow {
    pub fn new(init: FlowInit) -> Self {
        Self {
            init,
            spec: FlowSpec::new().require(&["zone_uuid", "colls"]).lock(false),
        }
    }

    fn zone_uuid(&self) -> Result<Uuid, FlowError> {
        uuid_param(&self.init.parameters, "zone_uuid")
    }
}

#[async_trait]
impl Flow for ZoneCreateFlow {
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
        self.zone_uuid()?;
        str_list_param(&self.init.parameters, "colls")?;
        opt_str_param(&self.init.parameters, "script_user")?;
        Ok(())
    }

    async fn domain_target(&self) -> Option<DomainTarget> {
        let zone_uuid = self.zone_uuid().ok()?;
        let target = ZoneStatusTarget::new(self.init.services.zones.clone(), zone_uuid);
        Some(DomainTarget::new(
            format!("landing zone {zone_uuid}"),
            Arc::new(target),
            ZoneStatus::NotCreated.as_str(),
        ))
    }

    async fn build_tasks(&self, tasks: &mut TaskList) -> Result<()> {
        let params = &self.init.parameters;
        let services = &self.init.services;
        let storage = services.storage.clone();

        let zone_uuid = self.zone_uuid()?;
        let zone = services
            .zones
            .get(&zone_uuid)
            .await?
            .ok_or_else(|| anyhow!("Landing zone {zone_uuid} not found"))?;
        if zone.project_uuid != self.init.project_uuid {
            bail!("Landing zone {zone_uuid} does not belong to project {}", self.init.project_uuid);
        }

        let colls = str_list_param(params, "colls")?;
        for coll in &colls {
            check_collection_name(coll)?;
        }
        let script_user = opt_str_param(params, "script_user")?;

        let zone_root = services.paths.zone_root(&zone.project_uuid);
        let user_path = services.paths.zone_user_path(&zone.project_uuid, &zone.username);
        let zone_path = services.paths.zone_path(&zone);
        let group = services.paths.user_group_name(&zone.project_uuid);

        tasks.add(RevertDomainStatusTask::new(
            "Revert landing zone status on failure",
            ZoneStatus::NotCreated.as_str(),
            FAILURE_PREFIX,
        ));
        tasks.add(CreateCollectionTask::new(
            "Create collection for landing zone root",
            storage.clone(),
            &zone_root,
        ));
        tasks.add(SetAccessTask::new(
            "Set project user group read access for landing zone root",
            storage.clone(),
            &zone_root,
            &group,
            AccessLevel::Read,
        ));
        tasks.add(CreateUserTask::new(
            &format!("Create user \"{}\"", zone.username),
            storage.clone(),
            &zone.username,
            UserKind::User,
        ));
        tasks.add(CreateCollectionTask::new(
            &format!("Create collection for user \"{}\" in landing zone root", zone.username),
            storage.clone(),
            &user_path,
        ));
        tasks.add(SetAccessTask::new(
            &format!("Set user \"{}\" read access for user collection", zone.username),
            storage.clone(),
            &user_path,
            &zone.username,
            AccessLevel::Read,
        ));
        tasks.add(CreateCollectionTask::new(
            "Create collection for landing zone",
            storage.clone(),
            &zone_path,
        ));
        tasks.add(SetInheritanceTask::new(
            "Set inheritance for landing zone collection",
            storage.clone(),
            &zone_path,
            true,
        ));
        tasks.add(SetAccessTask::new(
            &format!("Set user \"{}\" owner access for landing zone", zone.username),
            storage.clone(),
            &zone_path,
            &zone.username,
            AccessLevel::Own,
        ));

        // The script user is provisioned elsewhere; the access task fails if it is missing
        if let Some(script_user) = script_user {
            tasks.add(SetAccessTask::new(
                &format!("Set script user \"{script_user}\" write access for landing zone"),
                storage.clone(),
                &zone_path,
                script_user,
                AccessLevel::Write,
            ));
        }

        if let Some(description) = zone.description.as_deref().filter(|d| !d.is_empty()) {
            tasks.add(SetMetadataTask::new(
                "Set description metadata for landing zone",
                storage.clone(),
                &zone_path,
                "description",
                description,
            ));
        }

        for coll in &colls {
            tasks.add(CreateCollectionTask::new(
                &format!("Create collection \"{coll}\" in landing zone"),
                storage.clone(),
                &join(&zone_path, coll),
            ));
        }

        tasks.add(SetDomainStatusTask::new(
            "Set landing zone status to ACTIVE",
            ZoneStatus::Active.as_str(),
            ACTIVE_MESSAGE,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::zones::{LandingZone, MemoryZoneRepository};
    use crate::engine::mocks::test_services;
    use crate::engine::{FlowServices, Mode};
    use serde_json::json;

    fn setup(colls: serde_json::Value) -> (ZoneCreateFlow, LandingZone) {
        let project_uuid = Uuid::new_v4();
        let zones = Arc::new(MemoryZoneRepository::new());
        let mut zone = LandingZone::new(project_uuid, "alice", "study/assay", "zone1");
        zone.description = Some("test zone".to_string());
        zones.insert(zone.clone());

        let services = FlowServices {
            zones,
            ..test_services()
        };
        let parameters = json!({"zone_uuid": zone.uuid.to_string(), "colls": colls})
            .as_object()
            .cloned()
            .unwrap();
        let flow = ZoneCreateFlow::new(FlowInit {
            project_uuid,
            flow_name: NAME.to_string(),
            parameters,
            mode: Mode::Sync,
            services,
        });
        (flow, zone)
    }

    #[tokio::test]
    async fn chain_starts_with_revert_and_ends_with_status() {
        let (flow, _) = setup(json!(["RawData", "MiscFiles"]));
        let tasks = flow.build(false).await.unwrap();
        let names = tasks.names();

        assert_eq!(names.first().map(String::as_str), Some("Revert landing zone status on failure"));
        assert_eq!(names.last().map(String::as_str), Some("Set landing zone status to ACTIVE"));
        assert!(names.iter().any(|n| n.contains("\"RawData\"")));
        assert!(names.iter().any(|n| n.contains("description")));
        assert_eq!(names.len(), 13);
    }

    #[tokio::test]
    async fn invalid_collection_names_fail_the_build() {
        let (flow, _) = setup(json!(["ok", ".."]));
        let err = flow.build(false).await.unwrap_err();
        assert!(matches!(err, FlowError::Build { ref message } if message.contains("\"..\"")));
    }

    #[tokio::test]
    async fn missing_zone_fails_the_build() {
        let (flow, _) = setup(json!([]));
        let other = ZoneCreateFlow::new(FlowInit {
            parameters: json!({"zone_uuid": Uuid::new_v4().to_string(), "colls": []})
                .as_object()
                .cloned()
                .unwrap(),
            ..flow.init.clone()
        });
        let err = other.build(false).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn runs_without_lock_in_both_modes() {
        let (flow, _) = setup(json!([]));
        assert!(!flow.spec().require_lock);
        assert!(flow.validate(Mode::Async).is_ok());
    }

    #[test]
    fn malformed_zone_uuid_is_a_validation_error() {
        let (flow, _) = setup(json!([]));
        let bad = ZoneCreateFlow::new(FlowInit {
            parameters: json!({"zone_uuid": "zone-1", "colls": []}).as_object().cloned().unwrap(),
            ..flow.init.clone()
        });
        assert!(matches!(
            bad.validate(Mode::Sync),
            Err(FlowError::InvalidParameter { .. })
        ));
    }
}
