//! Worker lifecycle status, the agent-reported result contract, and the
//! orchestrator's enriched execution record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle status of a worker, mutually exclusive per the data-model invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Admitted but waiting on the concurrency semaphore.
    Queued,
    /// Holding the semaphore; agent process is running.
    Running,
    /// Completed in-scope with a `success` result.
    Completed,
    /// Exited non-zero, or its result was downgraded.
    Failed,
    /// Denied admission by the budget tracker; no process was spawned.
    Blocked,
    /// Exceeded its wall-clock timeout and was killed.
    TimedOut,
    /// Completed but touched files outside its declared scope; awaiting `merge_results`.
    PendingApproval,
    /// Branch was merged into the main working copy.
    Merged,
    /// Merge attempt conflicted; branch retained for postmortem.
    MergeConflict,
}

/// Outcome contract a worker agent writes to
/// `<worktree>/.codex-worker-result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerResult {
    /// Agent-reported completion status, independent of the orchestrator's
    /// `WorkerStatus` (which may further downgrade this).
    pub status: WorkerResultStatus,
    /// Free-text summary of the work performed.
    pub summary: String,
    /// Files the agent reports modifying.
    #[serde(default)]
    pub files_modified: Vec<String>,
    /// Files the agent reports creating.
    #[serde(default)]
    pub files_created: Vec<String>,
    /// Files the agent reports deleting.
    #[serde(default)]
    pub files_deleted: Vec<String>,
    /// Notable decisions made during the task.
    #[serde(default)]
    pub key_decisions: Vec<String>,
    /// Non-fatal issues the agent wants surfaced to the supervisor.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Agent's self-reported test outcome.
    #[serde(default)]
    pub tests_status: TestsStatus,
    /// Agent's self-reported confidence, clamped to `[0, 1]` on load.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

const fn default_confidence() -> f64 {
    0.5
}

impl WorkerResult {
    /// Clamp `confidence` into `[0, 1]` in place. The result file is
    /// untrusted input; this is applied immediately after deserialization.
    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    /// Build the synthesized `partial` result used when the worker's result
    /// file is missing or invalid (spec §4.3 step 10).
    #[must_use]
    pub fn synthesize_partial(summary: String, files_modified: Vec<String>) -> Self {
        Self {
            status: WorkerResultStatus::Partial,
            summary,
            files_modified,
            files_created: Vec::new(),
            files_deleted: Vec::new(),
            key_decisions: Vec::new(),
            warnings: vec!["Missing or invalid worker result file".to_string()],
            tests_status: TestsStatus::Skipped,
            confidence: 0.4,
        }
    }
}

/// Agent-reported completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerResultStatus {
    /// Work completed as intended.
    Success,
    /// Work completed with caveats (also used for synthesized/downgraded results).
    Partial,
    /// Work could not be completed.
    Failed,
    /// Admission was denied; no work was attempted.
    Blocked,
}

/// Agent-reported test outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestsStatus {
    /// Tests were run and passed.
    Passed,
    /// Tests were run and failed.
    Failed,
    /// Tests were not run.
    Skipped,
}

impl Default for TestsStatus {
    fn default() -> Self {
        Self::Skipped
    }
}

/// Token accounting for a single agent invocation (worker or supervisor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub input_tokens: u64,
    /// Subset of `input_tokens` served from cache (informational only).
    pub cached_input_tokens: u64,
    /// Tokens in the completion.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// `input_tokens + output_tokens`. Cached tokens are informational and excluded.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// `max(0, input_tokens - cached_input_tokens)`.
    #[must_use]
    pub fn billable_input_tokens(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_input_tokens)
    }

    /// Add another usage delta in place, saturating rather than overflowing.
    pub fn accumulate(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.cached_input_tokens = self
            .cached_input_tokens
            .saturating_add(other.cached_input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// The orchestrator's enriched record of a completed (or blocked) worker run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerExecutionResult {
    /// Worker id.
    pub worker_id: String,
    /// Branch name, if a worktree was created (`None` for blocked workers).
    pub branch: Option<String>,
    /// Worktree path, if one was created.
    pub worktree_path: Option<String>,
    /// The originating task text.
    pub task: String,
    /// Final lifecycle status after all downgrade rules are applied.
    pub status: WorkerStatus,
    /// The agent-reported (or synthesized) result contract.
    pub result: WorkerResult,
    /// Accumulated token usage for this worker.
    pub usage: TokenUsage,
    /// Estimated dollar cost attributed to this worker.
    pub estimated_cost: f64,
    /// `true` iff `out_of_scope_files` is non-empty at assembly time.
    pub requires_approval: bool,
    /// Files touched outside the declared scope.
    pub out_of_scope_files: Vec<String>,
    /// Unified diff of the worker's branch against `HEAD`, if computed.
    pub diff_text: Option<String>,
    /// Raw captured stdout.
    pub raw_stdout: String,
    /// Raw captured stderr.
    pub raw_stderr: String,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end time.
    pub ended_at: DateTime<Utc>,
}

/// Outcome of a single `mergeBranch` attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// The worker whose branch was (or was not) merged.
    pub worker_id: String,
    /// The branch name.
    pub branch: String,
    /// Whether the merge succeeded.
    pub merged: bool,
    /// Whether the merge failed due to a conflict (vs. being skipped for policy reasons).
    #[serde(default)]
    pub conflict: bool,
    /// Captured VCS output, or the policy reason the merge was skipped.
    pub message: String,
}

/// Point-in-time budget accounting snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Cumulative input tokens across all workers and the supervisor.
    pub total_input_tokens: u64,
    /// Cumulative output tokens.
    pub total_output_tokens: u64,
    /// Cumulative estimated cost in dollars, rounded to 6 decimal places.
    pub total_cost: f64,
    /// Sticky flag, set once cumulative cost crosses `warn_at_percent` of `max_total_cost`.
    pub warned: bool,
    /// Per-worker cost attribution.
    pub worker_costs: HashMap<String, f64>,
}
