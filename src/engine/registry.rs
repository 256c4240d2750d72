use std::collections::HashMap;
use std::sync::Arc;

use super::errors::FlowError;
use super::flow::{Flow, FlowInit};

/// Builds a fresh flow instance for one submission
pub type FlowConstructor = Arc<dyn Fn(FlowInit) -> Box<dyn Flow> + Send + Sync>;

/// Maps flow names to constructors. Populated once at startup, then shared read-only.
#[derive(Default, Clone)]
pub struct FlowRegistry {
    constructors: HashMap<String, FlowConstructor>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow under a unique name
    pub fn register<F>(&mut self, name: &str, constructor: F) -> Result<(), FlowError>
    where
        F: Fn(FlowInit) -> Box<dyn Flow> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(name) {
            return Err(FlowError::DuplicateFlow {
                name: name.to_string(),
            });
        }
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
        tracing::debug!(flow = name, "Registered flow");
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<FlowConstructor, FlowError> {
        self.constructors
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::UnknownFlow {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered flow names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("flows", &self.names())
            .finish()
    }
}
