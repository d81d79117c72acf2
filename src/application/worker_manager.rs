//! Bounded-concurrency worker execution, scope enforcement, and result
//! assembly (spec §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use globset::{Glob, GlobSetBuilder};
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, instrument};

use crate::domain::error::WorkerError;
use crate::domain::models::{
    EventPayload, SpawnAgentPayload, TestsStatus, TokenUsage, WorkerExecutionResult, WorkerResult,
    WorkerResultStatus, WorkerStatus,
};
use crate::domain::ports::{AgentLine, AgentRunner, AgentSpawnRequest, VcsDriver};

use super::budget_tracker::BudgetTracker;
use super::event_bus::EventBus;
use super::worktree_allocator::WorktreeAllocator;

/// A worker that has been admitted but has not yet produced a
/// `WorkerExecutionResult`, so it has no entry in the orchestrator's
/// `worker_records` table yet. `check_workers` unions these with its
/// completed-worker ids so an in-flight worker is reported (with its best-
/// known status) rather than silently omitted while its process is live.
#[derive(Debug, Clone)]
pub struct InFlightWorker {
    /// The worker's id.
    pub worker_id: String,
    /// The originating task text.
    pub task: String,
    /// The worker's last known lifecycle status (`Queued` or `Running`).
    pub status: WorkerStatus,
}

/// The fixed commit identity worker commits are authored under (spec §4.3 step 8).
const COMMIT_AUTHOR_NAME: &str = "Codex Swarm";
const COMMIT_AUTHOR_EMAIL: &str = "codex-swarm@local";
/// Worker result contract file name, relative to the worktree root (spec §3/§6).
const RESULT_FILE_NAME: &str = ".codex-worker-result.json";

/// Static configuration a `WorkerManager` needs per invocation; mirrors the
/// `swarm.*` configuration surface (spec §6).
#[derive(Debug, Clone)]
pub struct WorkerManagerConfig {
    /// Name or path of the agent CLI binary.
    pub codex_binary: String,
    /// Value passed to `-a`.
    pub approval_mode: String,
    /// Value passed to `-m`, when set.
    pub worker_model: Option<String>,
    /// Per-worker wall-clock timeout.
    pub worker_timeout: Duration,
    /// The ref worker worktrees are branched from (typically the main branch).
    pub base_ref: String,
}

/// Runs worker agents under a bounded concurrency semaphore, enforcing
/// declared file scope and assembling the orchestrator's enriched result
/// record for each one.
pub struct WorkerManager {
    semaphore: Arc<Semaphore>,
    vcs: Arc<dyn VcsDriver>,
    allocator: Arc<WorktreeAllocator>,
    agent_runner: Arc<dyn AgentRunner>,
    budget: Arc<BudgetTracker>,
    events: Arc<EventBus>,
    config: WorkerManagerConfig,
    worker_branches: RwLock<HashMap<String, String>>,
    in_flight: RwLock<HashMap<String, InFlightWorker>>,
}

impl WorkerManager {
    /// Build a manager with a semaphore of size `max_workers`.
    #[must_use]
    pub fn new(
        max_workers: usize,
        vcs: Arc<dyn VcsDriver>,
        allocator: Arc<WorktreeAllocator>,
        agent_runner: Arc<dyn AgentRunner>,
        budget: Arc<BudgetTracker>,
        events: Arc<EventBus>,
        config: WorkerManagerConfig,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            vcs,
            allocator,
            agent_runner,
            budget,
            events,
            config,
            worker_branches: RwLock::new(HashMap::new()),
            in_flight: RwLock::new(HashMap::new()),
        }
    }

    /// The branch name recorded for `worker_id`, if its worktree is still live.
    pub async fn branch_for(&self, worker_id: &str) -> Option<String> {
        self.worker_branches.read().await.get(worker_id).cloned()
    }

    /// Every worker currently admitted but not yet resolved to a final
    /// `WorkerExecutionResult` (spec §9's `check_workers` "running" open
    /// question: surfaced here so callers can union it with their own
    /// completed-worker bookkeeping).
    pub async fn in_flight_snapshot(&self) -> Vec<InFlightWorker> {
        self.in_flight.read().await.values().cloned().collect()
    }

    fn random_worker_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    fn build_prompt(payload: &SpawnAgentPayload, extra_context: Option<&str>) -> String {
        let mut prompt = String::new();
        prompt.push_str("Task:\n");
        prompt.push_str(&payload.task);
        prompt.push_str("\n\n");
        if payload.scope.is_empty() {
            prompt.push_str("Allowed scope: unrestricted.\n\n");
        } else {
            prompt.push_str("Allowed scope (you must not modify files outside these patterns):\n");
            for pattern in &payload.scope {
                prompt.push_str(pattern);
                prompt.push('\n');
            }
            prompt.push('\n');
        }
        if !payload.context.is_empty() {
            prompt.push_str("Context:\n");
            prompt.push_str(&payload.context);
            prompt.push_str("\n\n");
        }
        if let Some(extra) = extra_context {
            if !extra.is_empty() {
                prompt.push_str(extra);
                prompt.push_str("\n\n");
            }
        }
        prompt.push_str(&format!(
            "When you are finished, write a JSON file at {RESULT_FILE_NAME} in the \
             repository root with this exact shape: {{\"status\": \"success|partial|failed\", \
             \"summary\": string, \"files_modified\": [string], \"files_created\": [string], \
             \"files_deleted\": [string], \"key_decisions\": [string], \"warnings\": [string], \
             \"tests_status\": \"passed|failed|skipped\", \"confidence\": number between 0 and 1}}."
        ));
        prompt
    }

    fn scope_matches(scope: &[String], files: &[String]) -> Vec<String> {
        if scope.is_empty() {
            return Vec::new();
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in scope {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        let Ok(set) = builder.build() else {
            return files.to_vec();
        };
        files
            .iter()
            .filter(|f| !set.is_match(f.as_str()))
            .cloned()
            .collect()
    }

    fn synthetic_blocked_result(payload: &SpawnAgentPayload, reason: &str) -> WorkerExecutionResult {
        let now = Utc::now();
        WorkerExecutionResult {
            worker_id: String::new(),
            branch: None,
            worktree_path: None,
            task: payload.task.clone(),
            status: WorkerStatus::Blocked,
            result: WorkerResult {
                status: WorkerResultStatus::Blocked,
                summary: reason.to_string(),
                files_modified: Vec::new(),
                files_created: Vec::new(),
                files_deleted: Vec::new(),
                key_decisions: Vec::new(),
                warnings: vec![reason.to_string()],
                tests_status: TestsStatus::Skipped,
                confidence: 0.0,
            },
            usage: TokenUsage::default(),
            estimated_cost: 0.0,
            requires_approval: false,
            out_of_scope_files: Vec::new(),
            diff_text: None,
            raw_stdout: String::new(),
            raw_stderr: String::new(),
            started_at: now,
            ended_at: now,
        }
    }

    /// Execute one worker task end to end (spec §4.3 steps 1–13).
    #[instrument(skip(self, payload, extra_context), fields(worker_id = tracing::field::Empty))]
    pub async fn run_task(
        &self,
        payload: SpawnAgentPayload,
        extra_context: Option<String>,
        worker_id: Option<String>,
    ) -> WorkerExecutionResult {
        let wid = worker_id.unwrap_or_else(Self::random_worker_id);
        tracing::Span::current().record("worker_id", tracing::field::display(&wid));

        // Step 2: admission control.
        if !self.budget.can_spawn().await {
            self.events.publish(EventPayload::WorkerStatusChanged {
                worker_id: wid.clone(),
                status: WorkerStatus::Blocked,
                task: Some(payload.task.clone()),
            });
            let mut result = Self::synthetic_blocked_result(&payload, "worker blocked by budget policy");
            result.worker_id = wid;
            return result;
        }

        // Step 3: queued -> acquire semaphore -> running.
        self.events.publish(EventPayload::WorkerStatusChanged {
            worker_id: wid.clone(),
            status: WorkerStatus::Queued,
            task: Some(payload.task.clone()),
        });
        self.in_flight.write().await.insert(
            wid.clone(),
            InFlightWorker {
                worker_id: wid.clone(),
                task: payload.task.clone(),
                status: WorkerStatus::Queued,
            },
        );
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");
        self.events.publish(EventPayload::WorkerStatusChanged {
            worker_id: wid.clone(),
            status: WorkerStatus::Running,
            task: Some(payload.task.clone()),
        });
        if let Some(entry) = self.in_flight.write().await.get_mut(&wid) {
            entry.status = WorkerStatus::Running;
        }

        let started_at = Utc::now();

        // Step 4: worktree.
        let mut worktree = match self.allocator.create(&wid, &self.config.base_ref).await {
            Ok(wt) => wt,
            Err(e) => {
                self.events.publish(EventPayload::WorkerStatusChanged {
                    worker_id: wid.clone(),
                    status: WorkerStatus::Failed,
                    task: Some(payload.task.clone()),
                });
                let mut result = Self::synthetic_blocked_result(&payload, &format!("worktree setup failed: {e}"));
                self.in_flight.write().await.remove(&wid);
                result.worker_id = wid;
                result.status = WorkerStatus::Failed;
                result.result.status = WorkerResultStatus::Failed;
                return result;
            }
        };
        self.worker_branches
            .write()
            .await
            .insert(wid.clone(), worktree.branch.clone());

        // Step 5: prompt.
        let prompt = Self::build_prompt(&payload, extra_context.as_deref());

        // Step 6: run the agent.
        let request = AgentSpawnRequest {
            handle: wid.clone(),
            binary: self.config.codex_binary.clone(),
            approval_mode: self.config.approval_mode.clone(),
            model: self.config.worker_model.clone(),
            work_dir: worktree.path.clone(),
            prompt,
            timeout: self.config.worker_timeout,
        };
        let outcome = match self.agent_runner.run(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.events.publish(EventPayload::WorkerStatusChanged {
                    worker_id: wid.clone(),
                    status: WorkerStatus::Failed,
                    task: Some(payload.task.clone()),
                });
                worktree.fail();
                self.in_flight.write().await.remove(&wid);
                let mut result = Self::synthetic_blocked_result(&payload, &format!("agent invocation failed: {e}"));
                result.worker_id = wid.clone();
                result.branch = Some(worktree.branch.clone());
                result.worktree_path = Some(worktree.path.clone());
                result.status = WorkerStatus::Failed;
                result.result.status = WorkerResultStatus::Failed;
                return result;
            }
        };

        let mut usage = TokenUsage::default();
        let mut last_message: Option<String> = None;
        for line in &outcome.lines {
            match line {
                AgentLine::Usage { usage: delta } => usage.accumulate(delta),
                AgentLine::AgentMessage { text } => last_message = Some(text.clone()),
            }
        }
        if usage.total_tokens() == 0 {
            usage = BudgetTracker::estimate_usage_from_text(&outcome.raw_stdout);
        }

        // Step 7: budget accounting.
        let (estimated_cost, snapshot) = self
            .budget
            .add_usage(&wid, self.config.worker_model.as_deref(), &usage)
            .await;
        self.events
            .publish(EventPayload::BudgetUpdated { snapshot });

        // Step 8: auto-commit.
        if let Err(e) = self
            .vcs
            .commit_all(
                &worktree.path,
                COMMIT_AUTHOR_NAME,
                COMMIT_AUTHOR_EMAIL,
                &format!("feat(worker): {wid} {}", truncate(&payload.task, 60)),
            )
            .await
        {
            tracing::warn!(worker_id = %wid, error = %e, "auto-commit failed");
        }

        // Step 9: diff.
        let range = format!("{}..{}", self.config.base_ref, worktree.branch);
        let files_changed = self.vcs.diff_name_only(&range).await.unwrap_or_default();
        let diff_text = self.vcs.diff(&range).await.ok();

        // Step 10: load or synthesize the result contract.
        let mut result = load_result_file(&worktree.path)
            .unwrap_or_else(|| {
                WorkerResult::synthesize_partial(
                    last_message
                        .clone()
                        .unwrap_or_else(|| "Worker produced no result file and no message.".to_string()),
                    files_changed.clone(),
                )
            });
        result.clamp_confidence();

        // Step 11: scope enforcement.
        let out_of_scope = Self::scope_matches(&payload.scope, &files_changed);

        // Step 12: resolve final status by priority.
        let mut status = WorkerStatus::Completed;
        if outcome.timed_out {
            status = WorkerStatus::TimedOut;
            downgrade(&mut result, "worker timed out");
        } else if outcome.exit_code != 0 {
            status = WorkerStatus::Failed;
            downgrade(&mut result, &format!("agent exited with code {}", outcome.exit_code));
        } else if !out_of_scope.is_empty() {
            status = WorkerStatus::PendingApproval;
            downgrade(&mut result, "worker touched files outside its declared scope");
        }

        worktree.complete();
        self.events.publish(EventPayload::WorkerStatusChanged {
            worker_id: wid.clone(),
            status,
            task: Some(payload.task.clone()),
        });
        self.in_flight.write().await.remove(&wid);

        let requires_approval = !out_of_scope.is_empty();
        let execution_result = WorkerExecutionResult {
            worker_id: wid.clone(),
            branch: Some(worktree.branch.clone()),
            worktree_path: Some(worktree.path.clone()),
            task: payload.task.clone(),
            status,
            result,
            usage,
            estimated_cost,
            requires_approval,
            out_of_scope_files: out_of_scope,
            diff_text,
            raw_stdout: outcome.raw_stdout,
            raw_stderr: outcome.raw_stderr,
            started_at,
            ended_at: Utc::now(),
        };

        self.events.publish(EventPayload::WorkerCompleted {
            worker_id: wid.clone(),
            status,
            task: payload.task,
            requires_approval,
            out_of_scope_files: execution_result.out_of_scope_files.clone(),
        });
        info!(worker_id = %wid, ?status, "worker completed");

        execution_result
        // _permit drops here (step 13): semaphore released. Worktree release
        // is the orchestrator's responsibility, after the merge decision.
    }

    /// Signal a running worker's process and await its exit. Returns `true`
    /// iff a live process was found, signalled, and has since exited.
    pub async fn cancel_worker(&self, worker_id: &str) -> bool {
        self.agent_runner.kill(worker_id).await
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn downgrade(result: &mut WorkerResult, reason: &str) {
    if result.status == WorkerResultStatus::Success {
        result.status = WorkerResultStatus::Partial;
    }
    result.warnings.push(reason.to_string());
}

fn load_result_file(worktree_path: &str) -> Option<WorkerResult> {
    let path = std::path::Path::new(worktree_path).join(RESULT_FILE_NAME);
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_matches_globstar_across_directories() {
        let scope = vec!["src/**".to_string()];
        let files = vec!["src/a.py".to_string(), "src/a/b.py".to_string(), "docs/n.md".to_string()];
        let out_of_scope = WorkerManager::scope_matches(&scope, &files);
        assert_eq!(out_of_scope, vec!["docs/n.md".to_string()]);
    }

    #[test]
    fn empty_scope_means_everything_is_in_scope() {
        let files = vec!["anything.rs".to_string()];
        assert!(WorkerManager::scope_matches(&[], &files).is_empty());
    }

    #[test]
    fn downgrade_only_lowers_success_never_raises_partial_or_failed() {
        let mut result = WorkerResult {
            status: WorkerResultStatus::Failed,
            summary: String::new(),
            files_modified: vec![],
            files_created: vec![],
            files_deleted: vec![],
            key_decisions: vec![],
            warnings: vec![],
            tests_status: TestsStatus::Skipped,
            confidence: 0.5,
        };
        downgrade(&mut result, "already failed");
        assert_eq!(result.status, WorkerResultStatus::Failed);
        assert_eq!(result.warnings, vec!["already failed".to_string()]);
    }

    #[test]
    fn truncate_respects_char_boundary_count() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("hi", 60), "hi");
    }

    proptest::proptest! {
        /// Property: an empty scope always means every path is in scope,
        /// no matter what the paths look like (spec §9's glob semantics,
        /// property 7).
        #[test]
        fn prop_empty_scope_is_always_fully_in_scope(
            files in proptest::collection::vec("[a-z0-9/_.-]{1,24}", 0..8)
        ) {
            proptest::prop_assert!(WorkerManager::scope_matches(&[], &files).is_empty());
        }

        /// Property: `scope_matches` only ever returns paths that were in
        /// the input, and a path that literally equals one of the scope
        /// patterns is never reported out-of-scope.
        #[test]
        fn prop_out_of_scope_is_a_subset_of_inputs_and_excludes_literal_matches(
            pattern in "[a-z]{1,8}",
            extra_files in proptest::collection::vec("[a-z0-9/_.-]{1,24}", 0..8)
        ) {
            let scope = vec![pattern.clone()];
            let mut files = extra_files.clone();
            files.push(pattern.clone());
            let out_of_scope = WorkerManager::scope_matches(&scope, &files);

            for path in &out_of_scope {
                proptest::prop_assert!(files.contains(path));
            }
            proptest::prop_assert!(!out_of_scope.contains(&pattern));
        }
    }
}
