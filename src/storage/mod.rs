// Storage backend abstraction used by flow tasks

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
use mockall::automock;

pub mod memory;
pub mod paths;
pub mod tasks;

pub use memory::MemoryStorage;
pub use paths::StoragePaths;
pub use tasks::{
    CreateCollectionTask, CreateUserTask, SetAccessTask, SetInheritanceTask, SetMetadataTask,
};

/// Access level of a principal on a collection. `Null` means no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Null,
    Read,
    Write,
    Own,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Null => "null",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Own => "own",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" | "none" => Ok(AccessLevel::Null),
            "read" => Ok(AccessLevel::Read),
            "write" | "modify" => Ok(AccessLevel::Write),
            "own" => Ok(AccessLevel::Own),
            other => Err(format!("Unknown access level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    User,
    Group,
}

/// Operations on the storage system holding project data.
///
/// Paths are absolute collection paths; principals are user or group names.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn collection_exists(&self, path: &str) -> Result<bool>;

    /// Create a collection and any missing parents. Existing collections are left as is.
    async fn create_collection(&self, path: &str) -> Result<()>;

    /// Remove a collection and everything below it
    async fn remove_collection(&self, path: &str) -> Result<()>;

    async fn get_access(&self, path: &str, principal: &str) -> Result<AccessLevel>;

    async fn set_access(
        &self,
        path: &str,
        principal: &str,
        level: AccessLevel,
        recursive: bool,
    ) -> Result<()>;

    async fn user_exists(&self, name: &str) -> Result<bool>;

    async fn create_user(&self, name: &str, kind: UserKind) -> Result<()>;

    async fn remove_user(&self, name: &str) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<String>>;

    async fn get_inheritance(&self, path: &str) -> Result<bool>;

    async fn set_inheritance(&self, path: &str, inherit: bool) -> Result<()>;

    async fn get_metadata(&self, path: &str, key: &str) -> Result<Option<String>>;

    async fn set_metadata(&self, path: &str, key: &str, value: &str) -> Result<()>;

    async fn remove_metadata(&self, path: &str, key: &str) -> Result<()>;
}
