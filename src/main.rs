//! Codex Swarm CLI entry point.

use anyhow::Result;
use clap::Parser;

use codex_swarm::cli::commands::{control, init, run};
use codex_swarm::cli::output::print_output;
use codex_swarm::cli::{Cli, Commands};
use codex_swarm::infrastructure::config::ConfigLoader;
use codex_swarm::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();
    let config = ConfigLoader::load(config_path.as_deref(), &cli.overrides)?;

    // `init` doesn't need a logger or a fully-validated runtime config (it
    // may be the very command that creates one), so it runs before the rest
    // of the process wiring.
    let Commands::Init(init_args) = cli.command else {
        let _logger = LoggerImpl::init(&log_config_from(&config.logging))?;
        run_command(cli.command, config, cli.json).await?;
        return Ok(());
    };

    let output = init::execute(init_args).await?;
    print_output(&output, cli.json);
    Ok(())
}

async fn run_command(command: Commands, config: codex_swarm::AppConfig, json: bool) -> Result<()> {
    match command {
        Commands::Init(_) => unreachable!("handled before logger init"),
        Commands::Run(args) => {
            let output = run::execute(args, config).await?;
            print_output(&output, json);
        }
        Commands::Workers => {
            let output = control::workers(&config).await?;
            print_output(&output, json);
        }
        Commands::Merge(args) => {
            let output = control::merge(&config, args).await?;
            print_output(&output, json);
        }
        Commands::Pause => {
            let output = control::pause(&config).await?;
            print_output(&output, json);
        }
        Commands::Resume => {
            let output = control::resume(&config).await?;
            print_output(&output, json);
        }
        Commands::Cancel(args) => {
            let output = control::cancel(&config, args).await?;
            print_output(&output, json);
        }
        Commands::KillSupervisor => {
            let output = control::kill_supervisor(&config).await?;
            print_output(&output, json);
        }
    }
    Ok(())
}

fn log_config_from(logging: &codex_swarm::domain::models::LoggingConfig) -> LogConfig {
    LogConfig {
        level: logging.level.clone(),
        format: if logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        log_dir: None,
        enable_stdout: true,
        rotation: codex_swarm::infrastructure::logging::RotationPolicy::Daily,
        retention_days: 30,
    }
}
