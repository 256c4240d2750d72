use anyhow::Result;
use project_taskflow::config::TaskflowConfig;
use project_taskflow::engine::{FlowInit, FlowServices, Mode, Parameters};
use project_taskflow::{default_registry, MemoryStorage, MemoryZoneRepository, StoragePaths};
use std::sync::Arc;
use uuid::Uuid;

use super::Command;

pub struct FlowsCommand {
    config: TaskflowConfig,
}

impl FlowsCommand {
    pub fn new(config: TaskflowConfig) -> Self {
        Self { config }
    }
}

impl Command for FlowsCommand {
    async fn execute(&self) -> Result<()> {
        let registry = default_registry()?;
        let services = FlowServices {
            storage: Arc::new(MemoryStorage::new()),
            zones: Arc::new(MemoryZoneRepository::new()),
            paths: StoragePaths::from_config(&self.config.storage),
        };

        println!("📋 Registered flows:");
        for name in registry.names() {
            let constructor = registry.resolve(&name)?;
            let flow = constructor(FlowInit {
                project_uuid: Uuid::nil(),
                flow_name: name.clone(),
                parameters: Parameters::new(),
                mode: Mode::Sync,
                services: services.clone(),
            });
            let spec = flow.spec();
            let modes: Vec<&str> = spec.supported_modes.iter().map(|m| m.as_str()).collect();
            println!("   🔧 {name}");
            println!("      required: {}", spec.required_fields.join(", "));
            println!("      modes:    {}", modes.join(", "));
            println!("      lock:     {}", if spec.require_lock { "yes" } else { "no" });
        }
        Ok(())
    }
}
