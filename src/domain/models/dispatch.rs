//! Dispatch payloads extracted from fenced supervisor tool blocks.

use serde::{Deserialize, Serialize};

/// Relative scheduling priority. Ordered `High < Normal < Low` so a
/// `sort_by_key` over this type dispatches high priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Dispatched first.
    High,
    /// Default priority.
    Normal,
    /// Dispatched last.
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// How much detail a worker's result is compressed to in the response file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFormat {
    /// Summary block only.
    Summary,
    /// Summary plus a truncated unified diff.
    Diff,
    /// Summary, full diff, and raw stdout.
    Full,
}

impl Default for ReturnFormat {
    fn default() -> Self {
        Self::Summary
    }
}

/// Scheduling strategy for a `spawn_swarm` dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Dispatch all tasks concurrently.
    FanOut,
    /// Dispatch tasks sequentially, threading a rolling summary forward.
    Pipeline,
    /// Fan-out followed by a reducer worker summarizing all results.
    MapReduce,
    /// Fan-out followed by picking a "winning" result by confidence.
    Debate,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::FanOut
    }
}

/// How a merge conflict should be resolved when explicitly requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveConflicts {
    /// Abort the merge on conflict (default).
    Abort,
    /// Prefer the main working copy's version of conflicting hunks.
    Ours,
    /// Prefer the worker branch's version of conflicting hunks.
    Theirs,
}

impl Default for ResolveConflicts {
    fn default() -> Self {
        Self::Abort
    }
}

/// A single worker task, after normalization (see `application::dispatch_parser`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnAgentPayload {
    /// The task description given to the worker agent. Non-empty after validation.
    pub task: String,

    /// Ordered gitignore-style glob patterns the worker's edits must stay within.
    /// Empty means unrestricted.
    #[serde(default)]
    pub scope: Vec<String>,

    /// Free-text context merged into the worker prompt.
    #[serde(default)]
    pub context: String,

    /// Scheduling priority.
    #[serde(default)]
    pub priority: Priority,

    /// Requested response compression.
    #[serde(default)]
    pub return_format: ReturnFormat,
}

/// A `spawn_swarm` dispatch: a batch of tasks plus a scheduling strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSwarmPayload {
    /// At least one task, validated non-empty by the dispatch parser.
    pub tasks: Vec<SpawnAgentPayload>,

    /// Scheduling strategy.
    #[serde(default)]
    pub strategy: Strategy,

    /// If false, the orchestrator queues the swarm in the background and
    /// replies immediately instead of waiting for completion.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

const fn default_wait() -> bool {
    true
}

/// A `check_workers` dispatch. Carries no fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckWorkersPayload {}

/// A `merge_results` dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeResultsPayload {
    /// Worker ids to merge. Defaults to the sorted pending-approval set when omitted.
    #[serde(default)]
    pub worker_ids: Option<Vec<String>>,

    /// Conflict resolution strategy applied to every merge in this request.
    #[serde(default)]
    pub resolve_conflicts: ResolveConflicts,
}

/// A validated, normalized dispatch ready for routing by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", content = "payload", rename_all = "snake_case")]
pub enum DispatchRequest {
    /// Spawn a single worker agent.
    SpawnAgent(SpawnAgentPayload),
    /// Spawn a batch of worker agents under a strategy.
    SpawnSwarm(SpawnSwarmPayload),
    /// Query worker/budget state.
    CheckWorkers(CheckWorkersPayload),
    /// Merge one or more pending-approval (or named) worker branches.
    MergeResults(MergeResultsPayload),
}

impl DispatchRequest {
    /// The tool tag this request was parsed from, used in log messages and
    /// the `dispatch.received` event payload.
    #[must_use]
    pub const fn tool_name(&self) -> &'static str {
        match self {
            Self::SpawnAgent(_) => "spawn_agent",
            Self::SpawnSwarm(_) => "spawn_swarm",
            Self::CheckWorkers(_) => "check_workers",
            Self::MergeResults(_) => "merge_results",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_high_before_normal_before_low() {
        let mut v = vec![Priority::Low, Priority::High, Priority::Normal];
        v.sort();
        assert_eq!(v, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn defaults_are_normal_summary_fan_out_abort() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(ReturnFormat::default(), ReturnFormat::Summary);
        assert_eq!(Strategy::default(), Strategy::FanOut);
        assert_eq!(ResolveConflicts::default(), ResolveConflicts::Abort);
    }

    #[test]
    fn tool_name_matches_wire_tag() {
        let req = DispatchRequest::CheckWorkers(CheckWorkersPayload {});
        assert_eq!(req.tool_name(), "check_workers");
    }
}
