use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimelineStatus {
    Init,
    Submit,
    Ok,
    Failed,
    Info,
    Cancel,
}

impl TimelineStatus {
    /// Statuses that close an audit event
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimelineStatus::Ok | TimelineStatus::Failed)
    }
}

impl fmt::Display for TimelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimelineStatus::Init => "INIT",
            TimelineStatus::Submit => "SUBMIT",
            TimelineStatus::Ok => "OK",
            TimelineStatus::Failed => "FAILED",
            TimelineStatus::Info => "INFO",
            TimelineStatus::Cancel => "CANCEL",
        };
        f.write_str(name)
    }
}

/// Audit trail sink
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Timeline: Send + Sync {
    async fn set_status(&self, event: Uuid, status: TimelineStatus, message: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub status: TimelineStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub event_name: String,
    pub description: String,
    pub statuses: Vec<TimelineEntry>,
}

/// Timeline kept in process memory
#[derive(Debug, Default)]
pub struct MemoryTimeline {
    events: Mutex<HashMap<Uuid, TimelineEvent>>,
}

impl MemoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event in `INIT` state and return its id
    pub fn add_event(&self, project_uuid: Uuid, event_name: &str, description: &str) -> Uuid {
        let uuid = Uuid::new_v4();
        let event = TimelineEvent {
            uuid,
            project_uuid,
            event_name: event_name.to_string(),
            description: description.to_string(),
            statuses: vec![TimelineEntry {
                status: TimelineStatus::Init,
                message: String::new(),
                timestamp: Utc::now(),
            }],
        };
        if let Ok(mut events) = self.events.lock() {
            events.insert(uuid, event);
        }
        uuid
    }

    pub fn event(&self, uuid: Uuid) -> Option<TimelineEvent> {
        self.events.lock().ok().and_then(|e| e.get(&uuid).cloned())
    }

    pub fn statuses(&self, uuid: Uuid) -> Vec<TimelineEntry> {
        self.event(uuid).map(|e| e.statuses).unwrap_or_default()
    }

    pub fn terminal_statuses(&self, uuid: Uuid) -> Vec<TimelineEntry> {
        self.statuses(uuid)
            .into_iter()
            .filter(|s| s.status.is_terminal())
            .collect()
    }
}

#[async_trait]
impl Timeline for MemoryTimeline {
    async fn set_status(&self, event: Uuid, status: TimelineStatus, message: &str) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow!("timeline poisoned"))?;
        let entry = events
            .get_mut(&event)
            .ok_or_else(|| anyhow!("Timeline event not found: {event}"))?;
        entry.statuses.push(TimelineEntry {
            status,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
