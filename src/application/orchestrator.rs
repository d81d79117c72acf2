//! Top-level composition (spec §2's control flow): runs the supervisor
//! agent, extracts dispatch blocks from its output, routes them to the
//! worker/strategy/merge subsystems, and appends rendered responses back to
//! the configured response file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::error::{OrchestratorError, WorkerError};
use crate::domain::models::{
    AppConfig, CheckWorkersPayload, DispatchRequest, EventPayload, MergeResultsPayload,
    ReturnFormat, SpawnAgentPayload, SpawnSwarmPayload, WorkerExecutionResult,
};
use crate::domain::ports::{AgentLine, AgentRunner, AgentSpawnRequest, VcsDriver};

use super::budget_tracker::BudgetTracker;
use super::dispatch_parser::extract_dispatches;
use super::event_bus::EventBus;
use super::ipc_server::{IpcServer, RequestHandler};
use super::merge_coordinator::MergeCoordinator;
use super::strategy_engine::StrategyEngine;
use super::worker_manager::{WorkerManager, WorkerManagerConfig};
use super::worktree_allocator::WorktreeAllocator;

/// The handle name `run_supervisor` registers with the `AgentRunner`, used
/// by `kill_supervisor`.
const SUPERVISOR_HANDLE: &str = "supervisor";

/// Bookkeeping kept per worker once it finishes, so later `check_workers`
/// and `merge_results` requests can be answered without re-running it.
struct WorkerRecord {
    result: WorkerExecutionResult,
}

/// Wires every application-layer component around one supervisor
/// invocation and answers IPC requests on their behalf.
///
/// Cheaply `Clone`: every field is either an `Arc`, a `String`, or `AppConfig`
/// (itself a small `Clone` value), so background tasks can hold an owned
/// copy without needing `Arc<Orchestrator>` at the call site.
#[derive(Clone)]
pub struct Orchestrator {
    config: AppConfig,
    agent_runner: Arc<dyn AgentRunner>,
    events: Arc<EventBus>,
    budget: Arc<BudgetTracker>,
    allocator: Arc<WorktreeAllocator>,
    worker_manager: Arc<WorkerManager>,
    strategy_engine: Arc<StrategyEngine>,
    merge_coordinator: Arc<MergeCoordinator>,
    worker_records: Arc<RwLock<HashMap<String, WorkerRecord>>>,
    repo_root: String,
}

impl Orchestrator {
    /// Build every application component from `config`, `vcs`, and
    /// `agent_runner`. The repo root defaults to the current directory; set
    /// [`Self::with_repo_root`] to override it.
    #[must_use]
    pub fn new(config: AppConfig, vcs: Arc<dyn VcsDriver>, agent_runner: Arc<dyn AgentRunner>) -> Self {
        let events = Arc::new(EventBus::default());
        let budget = Arc::new(BudgetTracker::new(
            config.budget.max_total_cost,
            config.budget.max_worker_cost,
            config.budget.max_total_tokens,
            config.budget.warn_at_percent,
            config.budget.model_pricing.clone(),
        ));
        let allocator = Arc::new(WorktreeAllocator::new(vcs.clone(), config.worktree.base_dir.clone()));
        let worker_manager_config = WorkerManagerConfig {
            codex_binary: config.swarm.codex_binary.clone(),
            approval_mode: config.swarm.approval_mode.clone(),
            worker_model: config.swarm.worker_model.clone(),
            worker_timeout: Duration::from_secs(config.swarm.worker_timeout),
            base_ref: "HEAD".to_string(),
        };
        let worker_manager = Arc::new(WorkerManager::new(
            config.swarm.max_workers,
            vcs.clone(),
            allocator.clone(),
            agent_runner.clone(),
            budget.clone(),
            events.clone(),
            worker_manager_config,
        ));
        let strategy_engine = Arc::new(StrategyEngine::new(
            worker_manager.clone(),
            config.swarm.pipeline_continue_on_error,
        ));
        let merge_coordinator = Arc::new(MergeCoordinator::new(
            vcs,
            allocator.clone(),
            events.clone(),
            config.worktree.auto_merge,
        ));

        Self {
            config,
            agent_runner,
            events,
            budget,
            allocator,
            worker_manager,
            strategy_engine,
            merge_coordinator,
            worker_records: Arc::new(RwLock::new(HashMap::new())),
            repo_root: ".".to_string(),
        }
    }

    /// Run the agent in `repo_root` instead of the current directory.
    #[must_use]
    pub fn with_repo_root(mut self, repo_root: impl Into<String>) -> Self {
        self.repo_root = repo_root.into();
        self
    }

    /// The shared event bus, for subscribers outside the orchestrator (e.g.
    /// a CLI command tailing events).
    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Prepare runtime state before serving: create the worktree base
    /// directory, sweep any worktrees left behind by a previous crash, and
    /// publish `OrchestratorStarted`.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        tokio::fs::create_dir_all(&self.config.worktree.base_dir)
            .await
            .map_err(|source| OrchestratorError::WorktreeBaseDirFailed {
                path: self.config.worktree.base_dir.clone(),
                source,
            })?;
        if let Err(e) = self.allocator.cleanup_stale().await {
            warn!(error = %e, "failed to clean up stale worktrees on startup");
        }
        self.events.publish(EventPayload::OrchestratorStarted);
        Ok(())
    }

    /// Cancel background work, publish `OrchestratorStopped`. The IPC
    /// socket file itself is removed by `IpcServer::serve` on return.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.events.publish(EventPayload::OrchestratorStopped);
    }

    /// Watch the event bus for the budget's sticky `warned` flag flipping to
    /// `true` for the first time, and forward it to `ipc` as a dedicated
    /// `budget_warning` frame (spec §4.7) the moment it happens, independent
    /// of any connected client's subscriber queue.
    pub fn spawn_budget_warning_watcher(&self, ipc: Arc<IpcServer>) {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            let mut already_warned = false;
            while let Ok(event) = rx.recv().await {
                if already_warned {
                    continue;
                }
                if let EventPayload::BudgetUpdated { snapshot } = event.payload {
                    if snapshot.warned {
                        already_warned = true;
                        ipc.notify_budget_warning(serde_json::to_value(&snapshot).unwrap_or(Value::Null));
                    }
                }
            }
        });
    }

    /// Run the supervisor to completion, extracting and handling every
    /// dispatch block its streamed output contains along the way.
    #[instrument(skip(self, task))]
    pub async fn run_supervisor(&self, task: String) -> Result<i32, WorkerError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<AgentLine>();
        let request = AgentSpawnRequest {
            handle: SUPERVISOR_HANDLE.to_string(),
            binary: self.config.swarm.codex_binary.clone(),
            approval_mode: self.config.swarm.approval_mode.clone(),
            model: self.config.swarm.supervisor_model.clone(),
            work_dir: self.repo_root.clone(),
            prompt: task,
            timeout: Duration::from_secs(self.config.swarm.supervisor_timeout),
        };

        let this = self.clone();
        let reader = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let AgentLine::AgentMessage { text } = line {
                    this.process_supervisor_message(&text).await;
                }
            }
        });

        let outcome = self.agent_runner.run_streaming(request, tx).await?;
        let _ = reader.await;

        if outcome.timed_out {
            self.events.publish(EventPayload::SupervisorKilled);
        } else {
            self.events.publish(EventPayload::SupervisorCompleted {
                exit_code: outcome.exit_code,
            });
        }
        Ok(outcome.exit_code)
    }

    async fn process_supervisor_message(&self, text: &str) {
        for parsed in extract_dispatches(text) {
            self.events.publish(EventPayload::DispatchReceived {
                tool: parsed.request.tool_name().to_string(),
                request_id: parsed.request_id.clone(),
            });
            let value = self.handle_dispatch(parsed.request).await;
            let rendered = render_dispatch_text(&value);
            self.write_response(&rendered, parsed.request_id.as_deref()).await;
        }
    }

    async fn handle_dispatch(&self, request: DispatchRequest) -> Value {
        match request {
            DispatchRequest::SpawnAgent(payload) => {
                let return_format = payload.return_format;
                let result = self.worker_manager.run_task(payload, None, None).await;
                let text = self.record_and_apply_merge(result, return_format).await;
                json!({ "text": text })
            }
            DispatchRequest::SpawnSwarm(payload) => {
                let text = self.handle_spawn_swarm(payload).await;
                json!({ "text": text })
            }
            DispatchRequest::CheckWorkers(_) => self.check_workers_snapshot().await,
            DispatchRequest::MergeResults(payload) => self.handle_merge_results(payload).await,
        }
    }

    async fn handle_spawn_swarm(&self, payload: SpawnSwarmPayload) -> String {
        let SpawnSwarmPayload { tasks, strategy, wait } = payload;
        if !wait {
            let this = self.clone();
            tokio::spawn(async move {
                let results = this.strategy_engine.dispatch(tasks, strategy).await;
                for result in results {
                    this.record_and_apply_merge(result, ReturnFormat::Summary).await;
                }
            });
            return "spawn_swarm queued (wait=false)".to_string();
        }

        let results = self.strategy_engine.dispatch(tasks, strategy).await;
        let mut rendered = Vec::with_capacity(results.len());
        for result in results {
            rendered.push(self.record_and_apply_merge(result, ReturnFormat::Summary).await);
        }
        rendered.join("\n---\n")
    }

    async fn record_and_apply_merge(&self, result: WorkerExecutionResult, return_format: ReturnFormat) -> String {
        let mut rendered = self.render_worker_result(&result, return_format);

        if let (Some(branch), Some(worktree_path)) = (result.branch.clone(), result.worktree_path.clone()) {
            let outcome = self
                .merge_coordinator
                .apply_auto_merge_policy(
                    &result.worker_id,
                    &branch,
                    &worktree_path,
                    result.status,
                    result.requires_approval,
                    &result.result.summary,
                    self.config.worktree.cleanup,
                )
                .await;
            rendered.push_str(&format!("\nmerge: {}\n", outcome.message));
        }

        let worker_id = result.worker_id.clone();
        self.worker_records.write().await.insert(worker_id, WorkerRecord { result });
        rendered
    }

    fn render_worker_result(&self, result: &WorkerExecutionResult, return_format: ReturnFormat) -> String {
        let summary = truncate_summary(&result.result.summary, self.config.results.max_summary_tokens);
        let mut out = format!("worker {} ({:?}): {}\n", result.worker_id, result.status, summary);
        if !result.result.warnings.is_empty() {
            out.push_str(&format!("warnings: {}\n", result.result.warnings.join("; ")));
        }
        if !result.out_of_scope_files.is_empty() {
            out.push_str(&format!("out of scope: {}\n", result.out_of_scope_files.join(", ")));
        }

        if matches!(return_format, ReturnFormat::Diff | ReturnFormat::Full) {
            if let Some(diff) = &result.diff_text {
                let truncated: String = diff
                    .lines()
                    .take(self.config.results.max_diff_lines)
                    .collect::<Vec<_>>()
                    .join("\n");
                out.push_str("\n```diff\n");
                out.push_str(&truncated);
                out.push_str("\n```\n");
            }
        }

        if matches!(return_format, ReturnFormat::Full) && !result.raw_stdout.is_empty() {
            out.push_str("\nraw stdout:\n");
            out.push_str(&result.raw_stdout);
        }

        out
    }

    async fn check_workers_snapshot(&self) -> Value {
        let records = self.worker_records.read().await;
        let mut workers = Vec::with_capacity(records.len());
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for (worker_id, record) in records.iter() {
            seen.insert(worker_id.clone());
            let running = self.agent_runner.is_running(worker_id).await;
            workers.push(json!({
                "worker_id": worker_id,
                "status": record.result.status,
                "running": running,
                "task": record.result.task,
                "requires_approval": record.result.requires_approval,
            }));
        }

        // Union in admitted-but-not-yet-resolved workers (queued/running, no
        // `WorkerExecutionResult` yet) so an in-flight worker is reported
        // while its process is still live, instead of only ever appearing
        // once it has already completed (spec §9's "running" open question).
        for worker in self.worker_manager.in_flight_snapshot().await {
            if !seen.insert(worker.worker_id.clone()) {
                continue;
            }
            let running = self.agent_runner.is_running(&worker.worker_id).await;
            workers.push(json!({
                "worker_id": worker.worker_id,
                "status": worker.status,
                "running": running,
                "task": worker.task,
                "requires_approval": false,
            }));
        }

        // A handle can in principle be live in the agent runner's own
        // process map without (yet) having an entry anywhere above, e.g. the
        // instant between spawn and `WorkerManager`'s own bookkeeping
        // catching up; surface it with a best-effort "unknown" status rather
        // than dropping it.
        for worker_id in self.agent_runner.running_handles().await {
            if !seen.insert(worker_id.clone()) {
                continue;
            }
            workers.push(json!({
                "worker_id": worker_id,
                "status": "unknown",
                "running": true,
                "task": Value::Null,
                "requires_approval": false,
            }));
        }

        let pending_approval = self.merge_coordinator.pending_approval().await;
        let snapshot = self.budget.snapshot().await;
        json!({
            "workers": workers,
            "pending_approval": pending_approval,
            "budget": snapshot,
        })
    }

    async fn handle_merge_results(&self, payload: MergeResultsPayload) -> Value {
        let records = self.worker_records.read().await;
        let lookup = |worker_id: &str| -> Option<(String, String, String)> {
            records.get(worker_id).and_then(|r| {
                let branch = r.result.branch.clone()?;
                let worktree_path = r.result.worktree_path.clone()?;
                Some((branch, worktree_path, r.result.result.summary.clone()))
            })
        };
        let outcomes = self
            .merge_coordinator
            .merge_results(payload.worker_ids, payload.resolve_conflicts, lookup, self.config.worktree.cleanup)
            .await;
        json!({ "outcomes": outcomes })
    }

    /// Append a response block to the configured response file, creating it
    /// if absent, executed off the event-loop thread (spec §6).
    async fn write_response(&self, text: &str, request_id: Option<&str>) {
        let request_id = request_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let path = PathBuf::from(&self.repo_root).join(&self.config.results.response_file);
        let block = format!(
            "<!-- codex-swarm-response:{request_id}:start -->\n{text}\n<!-- codex-swarm-response:{request_id}:end -->\n"
        );

        let write_result = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?
                .write_all(block.as_bytes())
        })
        .await;

        match write_result {
            Ok(Ok(())) => {
                self.events.publish(EventPayload::ResponseWritten {
                    path: self.config.results.response_file.clone(),
                    request_id,
                });
            }
            Ok(Err(e)) => warn!(error = %e, "failed to write response file"),
            Err(e) => warn!(error = %e, "response-file write task panicked"),
        }
    }
}

/// Shrink `summary` to roughly `max_tokens` tokens using the same
/// chars-per-token heuristic (`width = max_tokens * 4`) the result compressor
/// it was ported from uses, breaking on a word boundary when possible.
fn truncate_summary(summary: &str, max_tokens: u32) -> String {
    let width = (max_tokens as usize).saturating_mul(4);
    if width == 0 || summary.chars().count() <= width {
        return summary.to_string();
    }
    const PLACEHOLDER: &str = "...";
    let keep = width.saturating_sub(PLACEHOLDER.chars().count());
    let mut truncated: String = summary.chars().take(keep).collect();
    if let Some(last_space) = truncated.rfind(char::is_whitespace) {
        truncated.truncate(last_space);
    }
    format!("{}{PLACEHOLDER}", truncated.trim_end())
}

fn render_dispatch_text(value: &Value) -> String {
    value
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| serde_json::to_string_pretty(value).unwrap_or_default())
}

#[async_trait]
impl RequestHandler for Orchestrator {
    async fn handle_request(&self, message_type: &str, payload: Value) -> Result<Value, String> {
        match message_type {
            "spawn_agent" => {
                let payload: SpawnAgentPayload =
                    serde_json::from_value(payload).map_err(|e| format!("invalid spawn_agent payload: {e}"))?;
                Ok(self.handle_dispatch(DispatchRequest::SpawnAgent(payload)).await)
            }
            "spawn_swarm" => {
                let payload: SpawnSwarmPayload =
                    serde_json::from_value(payload).map_err(|e| format!("invalid spawn_swarm payload: {e}"))?;
                Ok(self.handle_dispatch(DispatchRequest::SpawnSwarm(payload)).await)
            }
            "check_workers" => Ok(self
                .handle_dispatch(DispatchRequest::CheckWorkers(CheckWorkersPayload {}))
                .await),
            "merge_results" => {
                let payload: MergeResultsPayload =
                    serde_json::from_value(payload).map_err(|e| format!("invalid merge_results payload: {e}"))?;
                Ok(self.handle_dispatch(DispatchRequest::MergeResults(payload)).await)
            }
            "pause_queue" => {
                self.strategy_engine.pause_queue();
                Ok(json!({}))
            }
            "resume_queue" => {
                self.strategy_engine.resume_queue();
                Ok(json!({}))
            }
            "cancel_worker" => {
                let worker_id = payload
                    .get("worker_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "cancel_worker requires a worker_id".to_string())?;
                let cancelled = self.worker_manager.cancel_worker(worker_id).await;
                Ok(json!({ "cancelled": cancelled }))
            }
            "kill_supervisor" => {
                let killed = self.agent_runner.kill(SUPERVISOR_HANDLE).await;
                if killed {
                    self.events.publish(EventPayload::SupervisorKilled);
                }
                Ok(json!({ "killed": killed }))
            }
            other => Err(format!("unsupported message type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_summary_passes_short_text_through_unchanged() {
        assert_eq!(truncate_summary("fixed the bug", 500), "fixed the bug");
    }

    #[test]
    fn truncate_summary_breaks_on_a_word_boundary_and_adds_a_placeholder() {
        let summary = "one two three four five six seven eight nine ten";
        let truncated = truncate_summary(summary, 5);
        assert_eq!(truncated, "one two three...");
        assert!(truncated.chars().count() <= 20);
    }

    #[test]
    fn truncate_summary_zero_tokens_is_a_no_op() {
        assert_eq!(truncate_summary("anything", 0), "anything");
    }
}
