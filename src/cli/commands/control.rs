//! IPC control subcommands: `workers`, `merge`, `pause`, `resume`, `cancel`,
//! `kill-supervisor`. Each connects to a running `codex-swarm run` process's
//! Unix socket and sends one framed request (spec §4.7, §6).

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde_json::json;

use crate::cli::ipc_client;
use crate::cli::output::CommandOutput;
use crate::cli::table;
use crate::domain::models::AppConfig;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Worker ids to merge. Defaults to the server's pending-approval set.
    #[arg(long = "worker-id")]
    pub worker_ids: Vec<String>,

    /// Conflict resolution strategy.
    #[arg(long, value_enum, default_value = "abort")]
    pub resolve: ResolveConflictsArg,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// The worker id to cancel.
    pub worker_id: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ResolveConflictsArg {
    Abort,
    Ours,
    Theirs,
}

impl ResolveConflictsArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Ours => "ours",
            Self::Theirs => "theirs",
        }
    }
}

/// A raw IPC reply, rendered as either pretty JSON or its embedded payload.
pub struct ReplyOutput(pub serde_json::Value);

impl CommandOutput for ReplyOutput {
    fn to_human(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        self.0.clone()
    }
}

async fn send(config: &AppConfig, message_type: &str, payload: serde_json::Value) -> Result<ReplyOutput> {
    let reply = ipc_client::request(
        &config.ipc.socket_path,
        &config.ipc.message_terminator,
        message_type,
        payload,
    )
    .await?;
    Ok(ReplyOutput(serde_json::to_value(&reply)?))
}

/// A `check_workers` reply, rendered as a `comfy-table` table for humans.
pub struct WorkersOutput(pub serde_json::Value);

impl CommandOutput for WorkersOutput {
    fn to_human(&self) -> String {
        table::format_workers(&self.0)
    }

    fn to_json(&self) -> serde_json::Value {
        self.0.clone()
    }
}

/// `codex-swarm workers` — `check_workers`.
pub async fn workers(config: &AppConfig) -> Result<WorkersOutput> {
    let reply = ipc_client::request(&config.ipc.socket_path, &config.ipc.message_terminator, "check_workers", json!({}))
        .await?;
    Ok(WorkersOutput(serde_json::to_value(&reply)?))
}

/// `codex-swarm merge` — `merge_results`.
pub async fn merge(config: &AppConfig, args: MergeArgs) -> Result<ReplyOutput> {
    let worker_ids = if args.worker_ids.is_empty() {
        serde_json::Value::Null
    } else {
        json!(args.worker_ids)
    };
    send(
        config,
        "merge_results",
        json!({ "worker_ids": worker_ids, "resolve_conflicts": args.resolve.as_str() }),
    )
    .await
}

/// `codex-swarm pause` — `pause_queue`.
pub async fn pause(config: &AppConfig) -> Result<ReplyOutput> {
    send(config, "pause_queue", json!({})).await
}

/// `codex-swarm resume` — `resume_queue`.
pub async fn resume(config: &AppConfig) -> Result<ReplyOutput> {
    send(config, "resume_queue", json!({})).await
}

/// `codex-swarm cancel <worker_id>` — `cancel_worker`.
pub async fn cancel(config: &AppConfig, args: CancelArgs) -> Result<ReplyOutput> {
    send(config, "cancel_worker", json!({ "worker_id": args.worker_id })).await
}

/// `codex-swarm kill-supervisor` — `kill_supervisor`.
pub async fn kill_supervisor(config: &AppConfig) -> Result<ReplyOutput> {
    send(config, "kill_supervisor", json!({})).await
}
