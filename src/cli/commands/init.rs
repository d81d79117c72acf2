//! Implementation of the `codex-swarm init` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use crate::cli::output::CommandOutput;
use crate::domain::models::AppConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to write the config file into (created if absent).
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing config file.
    #[arg(long, short)]
    pub force: bool,
}

/// Result of `init`, rendered by [`CommandOutput`].
#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub written: bool,
    pub config_path: PathBuf,
    pub message: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "written": self.written,
            "config_path": self.config_path,
            "message": self.message,
        })
    }
}

/// Write a commented default config YAML at `<path>/codex-swarm.yaml`.
///
/// # Errors
/// Propagates filesystem errors creating the directory or writing the file.
pub async fn execute(args: InitArgs) -> Result<InitOutput> {
    let dir = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir().context("failed to resolve current directory")?.join(&args.path)
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let config_path = dir.join("codex-swarm.yaml");
    if config_path.exists() && !args.force {
        return Ok(InitOutput {
            written: false,
            config_path,
            message: "codex-swarm.yaml already exists; pass --force to overwrite".to_string(),
        });
    }

    write_default_config(&config_path).await?;
    Ok(InitOutput {
        written: true,
        config_path: config_path.clone(),
        message: format!("wrote default configuration to {}", config_path.display()),
    })
}

async fn write_default_config(path: &Path) -> Result<()> {
    let defaults = AppConfig::default();
    let yaml = serde_yaml::to_string(&defaults).context("failed to render default configuration as YAML")?;
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
