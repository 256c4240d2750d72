use anyhow::Result;
use project_taskflow::config::TaskflowConfig;
use std::path::PathBuf;

use super::Command;

pub struct ConfigCommand {
    config: TaskflowConfig,
    output: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(config: TaskflowConfig) -> Self {
        Self {
            config,
            output: None,
        }
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        match &self.output {
            Some(path) => {
                self.config.save_to_file(path)?;
                println!("💾 Configuration written to {}", path.display());
            }
            None => print!("{}", toml::to_string_pretty(&self.config)?),
        }
        Ok(())
    }
}
