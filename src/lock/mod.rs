// Per-project mutual exclusion for flow execution

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::config::{LockBackend, LockConfig};

pub mod file;
pub mod memory;

pub use file::FileLockCoordinator;
pub use memory::MemoryLockCoordinator;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited_ms}ms waiting for lock on {resource_id}")]
    Timeout { resource_id: String, waited_ms: u64 },

    #[error("lock backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Proof of a held lock. Pass it back to `release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub resource_id: String,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl LockHandle {
    pub fn new(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            token: Uuid::new_v4(),
            acquired_at: Utc::now(),
        }
    }
}

/// Mutual exclusion keyed by resource id (the project UUID).
///
/// Non-reentrant: a second `acquire` for a held resource waits, even from the
/// same caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Wait up to `timeout` for exclusive ownership of `resource_id`
    async fn acquire(&self, resource_id: &str, timeout: Duration) -> Result<LockHandle, LockError>;

    /// Release a held lock. Returns false if the handle was not held.
    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError>;

    /// Whether this coordinator currently sees `resource_id` as held
    fn is_locked(&self, resource_id: &str) -> bool;
}

/// Build the configured lock backend
pub fn coordinator_from_config(config: &LockConfig) -> Result<Arc<dyn LockCoordinator>, LockError> {
    match config.backend {
        LockBackend::Memory => Ok(Arc::new(MemoryLockCoordinator::new())),
        LockBackend::File => Ok(Arc::new(FileLockCoordinator::new(
            &config.lock_dir,
            config.poll_interval(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_is_default() {
        let coordinator = coordinator_from_config(&LockConfig::default()).unwrap();
        assert!(!coordinator.is_locked("any"));
    }

    #[test]
    fn file_backend_creates_lock_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = LockConfig {
            backend: LockBackend::File,
            lock_dir: dir.path().join("locks"),
            ..LockConfig::default()
        };
        coordinator_from_config(&config).unwrap();
        assert!(dir.path().join("locks").is_dir());
    }
}
