use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{LockCoordinator, LockError, LockHandle};

/// In-process lock coordinator. Only serializes submissions of one engine process.
#[derive(Default)]
pub struct MemoryLockCoordinator {
    resources: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    held: Mutex<HashMap<Uuid, OwnedMutexGuard<()>>>,
}

impl MemoryLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn resource(&self, resource_id: &str) -> Result<Arc<AsyncMutex<()>>, LockError> {
        let mut resources = guard(&self.resources)?;
        Ok(resources
            .entry(resource_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Drop the table entry of a resource nobody holds or waits for
    fn prune(&self, resource_id: &str) -> Result<(), LockError> {
        let mut resources = guard(&self.resources)?;
        let idle = resources
            .get(resource_id)
            .is_some_and(|m| Arc::strong_count(m) == 1 && m.try_lock().is_ok());
        if idle {
            resources.remove(resource_id);
        }
        Ok(())
    }

    /// Number of locks currently held
    pub fn held_count(&self) -> usize {
        guard(&self.held).map(|h| h.len()).unwrap_or(0)
    }
}

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, LockError> {
    mutex.lock().map_err(|_| LockError::Unavailable {
        reason: "lock table poisoned".to_string(),
    })
}

#[async_trait]
impl LockCoordinator for MemoryLockCoordinator {
    async fn acquire(&self, resource_id: &str, timeout: Duration) -> Result<LockHandle, LockError> {
        let resource = self.resource(resource_id)?;
        let acquired = tokio::time::timeout(timeout, resource.lock_owned()).await;
        let owned = match acquired {
            Ok(owned) => owned,
            Err(_) => {
                self.prune(resource_id)?;
                return Err(LockError::Timeout {
                    resource_id: resource_id.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
        };

        let handle = LockHandle::new(resource_id);
        guard(&self.held)?.insert(handle.token, owned);
        debug!(resource = resource_id, token = %handle.token, "Acquired in-process lock");
        Ok(handle)
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError> {
        let released = guard(&self.held)?.remove(&handle.token);
        let was_held = released.is_some();
        drop(released);
        self.prune(&handle.resource_id)?;
        Ok(was_held)
    }

    fn is_locked(&self, resource_id: &str) -> bool {
        guard(&self.resources)
            .ok()
            .and_then(|r| r.get(resource_id).map(|m| m.try_lock().is_err()))
            .unwrap_or(false)
    }
}
