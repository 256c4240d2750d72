use anyhow::Result;
use clap::Parser;
use project_taskflow::config::TaskflowConfig;
use project_taskflow::telemetry::init_telemetry;

mod cli;

use cli::commands::config::ConfigCommand;
use cli::commands::demo::DemoCommand;
use cli::commands::flows::FlowsCommand;
use cli::commands::Command;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    TaskflowConfig::load_env_file()?;
    let config = TaskflowConfig::load()?;
    init_telemetry(&config.observability)?;

    match cli.command {
        None | Some(Commands::Flows) => tokio::runtime::Runtime::new()?.block_on(async {
            FlowsCommand::new(config).execute().await
        }),
        Some(Commands::Config { output }) => tokio::runtime::Runtime::new()?.block_on(async {
            ConfigCommand::new(config).with_output(output).execute().await
        }),
        Some(Commands::Demo {
            run_async,
            force_fail,
            colls,
        }) => tokio::runtime::Runtime::new()?.block_on(async {
            DemoCommand::new(config)
                .with_async(run_async)
                .with_force_fail(force_fail)
                .with_colls(colls)
                .execute()
                .await
        }),
    }
}
