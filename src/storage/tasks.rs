// Storage tasks used by flows.
//
// Creation tasks have no physical undo: reverting a created collection or
// user is logical only, the object stays in storage.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{AccessLevel, StorageBackend, UserKind};
use crate::engine::task::{Task, TaskContext};

pub struct CreateCollectionTask {
    name: String,
    storage: Arc<dyn StorageBackend>,
    path: String,
}

impl CreateCollectionTask {
    pub fn new(name: &str, storage: Arc<dyn StorageBackend>, path: &str) -> Self {
        Self {
            name: name.to_string(),
            storage,
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl Task for CreateCollectionTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        self.storage.create_collection(&self.path).await
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        debug!(path = %self.path, "Collection left in place on revert");
        Ok(())
    }
}

/// Set a principal's access, restoring the previous level on revert
pub struct SetAccessTask {
    name: String,
    storage: Arc<dyn StorageBackend>,
    path: String,
    principal: String,
    level: AccessLevel,
    recursive: bool,
    previous: Option<AccessLevel>,
}

impl SetAccessTask {
    pub fn new(
        name: &str,
        storage: Arc<dyn StorageBackend>,
        path: &str,
        principal: &str,
        level: AccessLevel,
    ) -> Self {
        Self {
            name: name.to_string(),
            storage,
            path: path.to_string(),
            principal: principal.to_string(),
            level,
            recursive: false,
            previous: None,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

#[async_trait]
impl Task for SetAccessTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        let previous = self.storage.get_access(&self.path, &self.principal).await?;
        self.storage
            .set_access(&self.path, &self.principal, self.level, self.recursive)
            .await?;
        self.previous = Some(previous);
        Ok(())
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };
        self.storage
            .set_access(&self.path, &self.principal, previous, self.recursive)
            .await
    }
}

pub struct CreateUserTask {
    name: String,
    storage: Arc<dyn StorageBackend>,
    user: String,
    kind: UserKind,
}

impl CreateUserTask {
    pub fn new(name: &str, storage: Arc<dyn StorageBackend>, user: &str, kind: UserKind) -> Self {
        Self {
            name: name.to_string(),
            storage,
            user: user.to_string(),
            kind,
        }
    }
}

#[async_trait]
impl Task for CreateUserTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        if self.storage.user_exists(&self.user).await? {
            debug!(user = %self.user, "User already exists");
            return Ok(());
        }
        self.storage.create_user(&self.user, self.kind).await
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }
}

pub struct SetInheritanceTask {
    name: String,
    storage: Arc<dyn StorageBackend>,
    path: String,
    inherit: bool,
    previous: Option<bool>,
}

impl SetInheritanceTask {
    pub fn new(name: &str, storage: Arc<dyn StorageBackend>, path: &str, inherit: bool) -> Self {
        Self {
            name: name.to_string(),
            storage,
            path: path.to_string(),
            inherit,
            previous: None,
        }
    }
}

#[async_trait]
impl Task for SetInheritanceTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        let previous = self.storage.get_inheritance(&self.path).await?;
        self.storage.set_inheritance(&self.path, self.inherit).await?;
        self.previous = Some(previous);
        Ok(())
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.storage.set_inheritance(&self.path, previous).await,
            None => Ok(()),
        }
    }
}

pub struct SetMetadataTask {
    name: String,
    storage: Arc<dyn StorageBackend>,
    path: String,
    key: String,
    value: String,
    // Outer None: never executed
    previous: Option<Option<String>>,
}

impl SetMetadataTask {
    pub fn new(
        name: &str,
        storage: Arc<dyn StorageBackend>,
        path: &str,
        key: &str,
        value: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            storage,
            path: path.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            previous: None,
        }
    }
}

#[async_trait]
impl Task for SetMetadataTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        let previous = self.storage.get_metadata(&self.path, &self.key).await?;
        self.storage
            .set_metadata(&self.path, &self.key, &self.value)
            .await?;
        self.previous = Some(previous);
        Ok(())
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        match self.previous.take() {
            Some(Some(value)) => self.storage.set_metadata(&self.path, &self.key, &value).await,
            Some(None) => self.storage.remove_metadata(&self.path, &self.key).await,
            None => Ok(()),
        }
    }
}
