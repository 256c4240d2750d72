use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(about = "Transactional flow orchestration for project storage")]
#[command(long_about = "Taskflow runs multi-step storage changes as flows: ordered tasks executed under a \
                       per-project lock and compensated in reverse order on failure. Try 'taskflow demo' \
                       to run a landing zone creation against in-memory storage.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the registered flows and their properties
    Flows,
    /// Print the effective configuration as TOML
    Config {
        /// Write the configuration to this file instead of printing it
        #[arg(long, help = "Save the effective configuration to a TOML file")]
        output: Option<std::path::PathBuf>,
    },
    /// Create a demo project and landing zone using in-memory storage
    Demo {
        /// Queue the zone creation and let the worker pool run it
        #[arg(long = "async", help = "Submit zone_create in async mode through the job queue")]
        run_async: bool,
        /// Make the last task of the chain fail
        #[arg(long, help = "Inject a failure into the final task to exercise rollback")]
        force_fail: bool,
        /// Collections to create inside the landing zone
        #[arg(long, value_delimiter = ',', default_value = "RawData,MiscFiles")]
        colls: Vec<String>,
    },
}
