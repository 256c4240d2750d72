use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the taskflow engine
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskflowConfig {
    /// Flow execution settings
    pub engine: EngineConfig,
    /// Project lock settings
    pub lock: LockConfig,
    /// Storage path layout
    pub storage: StorageConfig,
    /// Background queue settings
    pub queue: QueueConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum length of failure messages written to status targets
    pub message_limit: usize,
    /// Allows destructive maintenance operations such as cleanup
    pub test_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_limit: 256,
            test_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// In-process locks, only valid for a single engine process
    Memory,
    /// Advisory file locks shared by every process using the same lock dir
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    /// How long a submission waits for a busy project lock
    pub acquire_timeout_seconds: u64,
    /// Directory holding the per-project lock files (file backend)
    pub lock_dir: PathBuf,
    /// Retry interval while polling a busy lock file (file backend)
    pub poll_interval_ms: u64,
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Memory,
            acquire_timeout_seconds: 30,
            lock_dir: PathBuf::from(".taskflow/locks"),
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage zone name, first element of every project path
    pub zone: String,
    /// Collection name for landing zones under a project
    pub landing_zone_dir: String,
    /// Prefix of the per-project user group
    pub user_group_prefix: String,
    /// Users never removed by cleanup
    pub permanent_users: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            zone: "omicsZone".to_string(),
            landing_zone_dir: "landing_zones".to_string(),
            user_group_prefix: "omics_project_".to_string(),
            permanent_users: ["client_user", "rods", "rodsadmin", "public"]
                .iter()
                .map(|u| u.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Time allowed for queued and in-flight jobs to finish on shutdown
    pub shutdown_timeout_seconds: u64,
}

impl QueueConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON formatted log lines
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl TaskflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (taskflow.toml, .taskflow-rc)
    /// 3. Environment variables (prefixed with TASKFLOW__)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("taskflow.toml").exists() {
            builder = builder.add_source(File::with_name("taskflow"));
        }

        if Path::new(".taskflow-rc").exists() {
            builder = builder.add_source(
                File::with_name(".taskflow-rc").format(config::FileFormat::Toml),
            );
        }

        // TASKFLOW__LOCK__BACKEND=file style overrides
        builder = builder.add_source(
            Environment::with_prefix("TASKFLOW")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("storage.permanent_users")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let taskflow_config: TaskflowConfig = config.try_deserialize()?;
        Ok(taskflow_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<TaskflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = TaskflowConfig::load_env_file();
        TaskflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static TaskflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TaskflowConfig::default();
        assert_eq!(config.engine.message_limit, 256);
        assert!(!config.engine.test_mode);
        assert_eq!(config.lock.backend, LockBackend::Memory);
        assert_eq!(config.lock.acquire_timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.zone, "omicsZone");
        assert!(config.storage.permanent_users.contains(&"rods".to_string()));
    }

    #[test]
    fn saved_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskflow.toml");

        let mut config = TaskflowConfig::default();
        config.lock.backend = LockBackend::File;
        config.engine.message_limit = 64;
        config.save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("backend = \"file\""));

        let parsed: TaskflowConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.lock.backend, LockBackend::File);
        assert_eq!(parsed.engine.message_limit, 64);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: TaskflowConfig = toml::from_str("[lock]\nacquire_timeout_seconds = 5\n").unwrap();
        assert_eq!(parsed.lock.acquire_timeout_seconds, 5);
        assert_eq!(parsed.lock.poll_interval_ms, 50);
        assert_eq!(parsed.storage.landing_zone_dir, "landing_zones");
    }
}
