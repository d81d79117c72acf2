//! Implementation of the `codex-swarm run` command: the main entrypoint that
//! drives one supervisor invocation to completion (spec §2's control flow).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use tokio::sync::oneshot;

use crate::adapters::{GitVcsDriver, ProcessAgentRunner};
use crate::application::orchestrator::Orchestrator;
use crate::application::ipc_server::IpcServer;
use crate::cli::output::CommandOutput;
use crate::domain::models::{AppConfig, IpcMethod};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The task prompt handed to the supervisor agent.
    #[arg(short, long)]
    pub task: String,

    /// Repository root the supervisor and worker worktrees are derived
    /// from. Defaults to the current directory.
    #[arg(long)]
    pub repo_root: Option<PathBuf>,
}

/// Result of `run`, rendered by [`CommandOutput`].
#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub exit_code: i32,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        format!("supervisor exited with code {}", self.exit_code)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "exit_code": self.exit_code })
    }
}

/// Wire every application component together and run the supervisor to
/// completion, serving IPC alongside it.
///
/// # Errors
/// Propagates worktree/base-directory setup failures and supervisor launch
/// failures (the `Fatal` taxonomy entry, spec §7).
pub async fn execute(args: RunArgs, config: AppConfig) -> Result<RunOutput> {
    let repo_root = args
        .repo_root
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());

    let vcs = Arc::new(GitVcsDriver::new(repo_root.clone()));
    let agent_runner = Arc::new(ProcessAgentRunner::new());
    let orchestrator = Orchestrator::new(config.clone(), vcs, agent_runner).with_repo_root(repo_root);

    orchestrator.start().await.context("failed to start orchestrator")?;

    let (ipc_shutdown_tx, ipc_shutdown_rx) = oneshot::channel();
    let ipc_task = if matches!(config.ipc.method, IpcMethod::UnixSocket) {
        let ipc = Arc::new(IpcServer::new(
            config.ipc.socket_path.clone(),
            config.ipc.message_terminator.clone(),
            orchestrator.events(),
            Arc::new(orchestrator.clone()),
        ));
        orchestrator.spawn_budget_warning_watcher(ipc.clone());
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = ipc_shutdown_rx.await;
            };
            if let Err(e) = ipc.serve(shutdown).await {
                tracing::warn!(error = %e, "ipc server exited with an error");
            }
        }))
    } else {
        drop(ipc_shutdown_rx);
        None
    };

    let exit_code = orchestrator.run_supervisor(args.task).await.context("supervisor run failed")?;

    orchestrator.shutdown().await;
    let _ = ipc_shutdown_tx.send(());
    if let Some(task) = ipc_task {
        let _ = task.await;
    }

    Ok(RunOutput { exit_code })
}
