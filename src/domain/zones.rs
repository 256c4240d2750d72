// Landing zones: per-user writable areas inside a project

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::engine::reporting::StatusTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneStatus {
    Creating,
    NotCreated,
    Active,
    Failed,
    Moving,
    Moved,
    Deleting,
    Deleted,
}

impl ZoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Creating => "CREATING",
            ZoneStatus::NotCreated => "NOT_CREATED",
            ZoneStatus::Active => "ACTIVE",
            ZoneStatus::Failed => "FAILED",
            ZoneStatus::Moving => "MOVING",
            ZoneStatus::Moved => "MOVED",
            ZoneStatus::Deleting => "DELETING",
            ZoneStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace(' ', "_").as_str() {
            "CREATING" => Ok(ZoneStatus::Creating),
            "NOT_CREATED" => Ok(ZoneStatus::NotCreated),
            "ACTIVE" => Ok(ZoneStatus::Active),
            "FAILED" => Ok(ZoneStatus::Failed),
            "MOVING" => Ok(ZoneStatus::Moving),
            "MOVED" => Ok(ZoneStatus::Moved),
            "DELETING" => Ok(ZoneStatus::Deleting),
            "DELETED" => Ok(ZoneStatus::Deleted),
            other => Err(anyhow!("Unknown landing zone status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingZone {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub username: String,
    /// Assay location relative to the user's zone collection
    pub assay_dir: String,
    pub title: String,
    pub configuration: Option<String>,
    pub description: Option<String>,
    pub status: ZoneStatus,
    pub status_info: String,
}

impl LandingZone {
    pub fn new(project_uuid: Uuid, username: &str, assay_dir: &str, title: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            project_uuid,
            username: username.to_string(),
            assay_dir: assay_dir.to_string(),
            title: title.to_string(),
            configuration: None,
            description: None,
            status: ZoneStatus::Creating,
            status_info: "Creating landing zone".to_string(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn get(&self, uuid: &Uuid) -> Result<Option<LandingZone>>;

    async fn set_status(&self, uuid: &Uuid, status: ZoneStatus, info: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryZoneRepository {
    zones: Mutex<HashMap<Uuid, LandingZone>>,
    history: Mutex<Vec<(Uuid, ZoneStatus, String)>>,
}

impl MemoryZoneRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, zone: LandingZone) {
        if let Ok(mut zones) = self.zones.lock() {
            zones.insert(zone.uuid, zone);
        }
    }

    pub fn zone(&self, uuid: &Uuid) -> Option<LandingZone> {
        self.zones.lock().ok().and_then(|z| z.get(uuid).cloned())
    }

    /// Every status written for `uuid`, oldest first
    pub fn status_history(&self, uuid: &Uuid) -> Vec<(ZoneStatus, String)> {
        self.history
            .lock()
            .map(|h| {
                h.iter()
                    .filter(|(id, _, _)| id == uuid)
                    .map(|(_, status, info)| (*status, info.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ZoneRepository for MemoryZoneRepository {
    async fn get(&self, uuid: &Uuid) -> Result<Option<LandingZone>> {
        let zones = self.zones.lock().map_err(|_| anyhow!("zone table poisoned"))?;
        Ok(zones.get(uuid).cloned())
    }

    async fn set_status(&self, uuid: &Uuid, status: ZoneStatus, info: &str) -> Result<()> {
        {
            let mut zones = self.zones.lock().map_err(|_| anyhow!("zone table poisoned"))?;
            let zone = zones
                .get_mut(uuid)
                .ok_or_else(|| anyhow!("Landing zone not found: {uuid}"))?;
            zone.status = status;
            zone.status_info = info.to_string();
        }
        if let Ok(mut history) = self.history.lock() {
            history.push((*uuid, status, info.to_string()));
        }
        info!(zone = %uuid, status = %status, "Landing zone status updated");
        Ok(())
    }
}

/// Status target writing to one landing zone
pub struct ZoneStatusTarget {
    zones: Arc<dyn ZoneRepository>,
    zone_uuid: Uuid,
}

impl ZoneStatusTarget {
    pub fn new(zones: Arc<dyn ZoneRepository>, zone_uuid: Uuid) -> Self {
        Self { zones, zone_uuid }
    }
}

#[async_trait]
impl StatusTarget for ZoneStatusTarget {
    async fn set_status(&self, state: &str, message: &str) -> Result<()> {
        let status: ZoneStatus = state.parse()?;
        self.zones.set_status(&self.zone_uuid, status, message).await
    }
}
