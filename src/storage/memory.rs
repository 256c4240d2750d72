// In-memory storage backend for tests, demos and local development

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

use super::{AccessLevel, StorageBackend, UserKind};

#[derive(Debug, Default)]
struct StorageState {
    collections: BTreeSet<String>,
    access: BTreeMap<String, BTreeMap<String, AccessLevel>>,
    users: BTreeMap<String, UserKind>,
    inheritance: BTreeMap<String, bool>,
    metadata: BTreeMap<String, BTreeMap<String, String>>,
}

/// Storage backend holding everything in process memory.
///
/// Supports artificial latency and injected failures per operation and path.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
    latency: Option<Duration>,
    failures: Mutex<Vec<(String, String)>>,
    operations: Mutex<Vec<String>>,
}

fn is_below(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&format!("{}/", root.trim_end_matches('/')))
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation, to widen race windows in tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `operation` on `path` fail until cleared
    pub fn fail_on(&self, operation: &str, path: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((operation.to_string(), path.to_string()));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Log of mutating operations, as `<op> <path>`
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn collections(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.collections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Collections strictly below `root`
    pub fn collections_under(&self, root: &str) -> Vec<String> {
        self.collections()
            .into_iter()
            .filter(|c| c != root && is_below(c, root))
            .collect()
    }

    pub fn access_of(&self, path: &str, principal: &str) -> AccessLevel {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.access.get(path).and_then(|a| a.get(principal)).copied())
            .unwrap_or(AccessLevel::Null)
    }

    fn state(&self) -> Result<MutexGuard<'_, StorageState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("storage state poisoned"))
    }

    async fn begin(&self, operation: &str, path: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures
            .lock()
            .map(|f| f.iter().any(|(op, p)| op == operation && p == path))
            .unwrap_or(false);
        if injected {
            bail!("Injected storage failure: {operation} {path}");
        }
        trace!(operation, path, "Storage operation");
        if let Ok(mut operations) = self.operations.lock() {
            operations.push(format!("{operation} {path}"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn collection_exists(&self, path: &str) -> Result<bool> {
        Ok(self.state()?.collections.contains(path))
    }

    async fn create_collection(&self, path: &str) -> Result<()> {
        if !path.starts_with('/') {
            bail!("Collection path must be absolute: {path}");
        }
        self.begin("create_collection", path).await?;
        let mut state = self.state()?;
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.collections.insert(current.clone());
        }
        Ok(())
    }

    async fn remove_collection(&self, path: &str) -> Result<()> {
        self.begin("remove_collection", path).await?;
        let mut state = self.state()?;
        state.collections.retain(|c| !is_below(c, path));
        state.access.retain(|c, _| !is_below(c, path));
        state.inheritance.retain(|c, _| !is_below(c, path));
        state.metadata.retain(|c, _| !is_below(c, path));
        Ok(())
    }

    async fn get_access(&self, path: &str, principal: &str) -> Result<AccessLevel> {
        let state = self.state()?;
        if !state.collections.contains(path) {
            bail!("Collection does not exist: {path}");
        }
        Ok(state
            .access
            .get(path)
            .and_then(|a| a.get(principal))
            .copied()
            .unwrap_or(AccessLevel::Null))
    }

    async fn set_access(
        &self,
        path: &str,
        principal: &str,
        level: AccessLevel,
        recursive: bool,
    ) -> Result<()> {
        self.begin("set_access", path).await?;
        let mut state = self.state()?;
        if !state.collections.contains(path) {
            bail!("Collection does not exist: {path}");
        }
        if !state.users.contains_key(principal) {
            bail!("User or group does not exist: {principal}");
        }
        let targets: Vec<String> = if recursive {
            state
                .collections
                .iter()
                .filter(|c| is_below(c, path))
                .cloned()
                .collect()
        } else {
            vec![path.to_string()]
        };
        for target in targets {
            let entries = state.access.entry(target).or_default();
            if level == AccessLevel::Null {
                entries.remove(principal);
            } else {
                entries.insert(principal.to_string(), level);
            }
        }
        Ok(())
    }

    async fn user_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state()?.users.contains_key(name))
    }

    async fn create_user(&self, name: &str, kind: UserKind) -> Result<()> {
        self.begin("create_user", name).await?;
        self.state()?.users.entry(name.to_string()).or_insert(kind);
        Ok(())
    }

    async fn remove_user(&self, name: &str) -> Result<()> {
        self.begin("remove_user", name).await?;
        let mut state = self.state()?;
        state.users.remove(name);
        for entries in state.access.values_mut() {
            entries.remove(name);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        Ok(self.state()?.users.keys().cloned().collect())
    }

    async fn get_inheritance(&self, path: &str) -> Result<bool> {
        Ok(self
            .state()?
            .inheritance
            .get(path)
            .copied()
            .unwrap_or(false))
    }

    async fn set_inheritance(&self, path: &str, inherit: bool) -> Result<()> {
        self.begin("set_inheritance", path).await?;
        let mut state = self.state()?;
        if !state.collections.contains(path) {
            bail!("Collection does not exist: {path}");
        }
        state.inheritance.insert(path.to_string(), inherit);
        Ok(())
    }

    async fn get_metadata(&self, path: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .state()?
            .metadata
            .get(path)
            .and_then(|m| m.get(key))
            .cloned())
    }

    async fn set_metadata(&self, path: &str, key: &str, value: &str) -> Result<()> {
        self.begin("set_metadata", path).await?;
        let mut state = self.state()?;
        if !state.collections.contains(path) {
            bail!("Collection does not exist: {path}");
        }
        state
            .metadata
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_metadata(&self, path: &str, key: &str) -> Result<()> {
        self.begin("remove_metadata", path).await?;
        if let Some(entries) = self.state()?.metadata.get_mut(path) {
            entries.remove(key);
        }
        Ok(())
    }
}
