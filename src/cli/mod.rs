//! CLI interface module: the `codex-swarm` binary's command surface.
//!
//! A terminal or desktop UI is an out-of-scope external collaborator (spec
//! §1) — this module only covers the process entrypoint and the IPC client
//! commands any such UI could be built from.

pub mod commands;
pub mod ipc_client;
pub mod output;
pub mod table;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::control::{CancelArgs, MergeArgs};
use commands::init::InitArgs;
use commands::run::RunArgs;

/// Orchestrator for a swarm of code-writing agents driven by an external AI
/// command-line binary.
#[derive(Parser, Debug)]
#[command(name = "codex-swarm", about = "Codex Swarm orchestrator", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Render command output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a YAML configuration file. Defaults to `./codex-swarm.yaml`
    /// if present, falling back to compiled-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Dotted-key configuration overrides, e.g. `swarm.max_workers=8`.
    /// May be repeated.
    #[arg(long = "set", global = true)]
    pub overrides: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file.
    Init(InitArgs),
    /// Run the supervisor agent to completion, serving IPC alongside it.
    Run(RunArgs),
    /// Query worker and budget state (`check_workers`).
    Workers,
    /// Merge one or more pending-approval worker branches (`merge_results`).
    Merge(MergeArgs),
    /// Pause the strategy engine's queue gate (`pause_queue`).
    Pause,
    /// Resume the strategy engine's queue gate (`resume_queue`).
    Resume,
    /// Cancel a running worker (`cancel_worker`).
    Cancel(CancelArgs),
    /// Kill the running supervisor process (`kill_supervisor`).
    KillSupervisor,
}

impl Cli {
    /// The config file path to load: the explicit `--config`, else
    /// `./codex-swarm.yaml` when it exists, else `None` (defaults only).
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        let default_path = PathBuf::from("codex-swarm.yaml");
        default_path.exists().then_some(default_path)
    }
}
