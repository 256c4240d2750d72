use uuid::Uuid;

use crate::config::StorageConfig;
use crate::domain::zones::LandingZone;

/// Path layout of projects and landing zones in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    zone: String,
    landing_zone_dir: String,
    user_group_prefix: String,
}

impl StoragePaths {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            zone: config.zone.clone(),
            landing_zone_dir: config.landing_zone_dir.clone(),
            user_group_prefix: config.user_group_prefix.clone(),
        }
    }

    pub fn projects_root(&self) -> String {
        format!("/{}/projects", self.zone)
    }

    /// `/<zone>/projects/<first two uuid chars>/<uuid>`
    pub fn project_path(&self, project_uuid: &Uuid) -> String {
        let uuid = project_uuid.to_string();
        format!("{}/{}/{}", self.projects_root(), &uuid[..2], uuid)
    }

    pub fn zone_root(&self, project_uuid: &Uuid) -> String {
        join(&self.project_path(project_uuid), &self.landing_zone_dir)
    }

    pub fn zone_user_path(&self, project_uuid: &Uuid, username: &str) -> String {
        join(&self.zone_root(project_uuid), username)
    }

    pub fn zone_path(&self, zone: &LandingZone) -> String {
        let mut title = zone.title.clone();
        if let Some(config) = zone.configuration.as_deref().filter(|c| !c.is_empty()) {
            title = format!("{title}_{config}");
        }
        let assay = join(
            &self.zone_user_path(&zone.project_uuid, &zone.username),
            &zone.assay_dir,
        );
        join(&assay, &title)
    }

    pub fn user_group_name(&self, project_uuid: &Uuid) -> String {
        format!("{}{}", self.user_group_prefix, project_uuid)
    }
}

/// Join a collection path and a child name
pub fn join(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.trim_matches('/'))
}
