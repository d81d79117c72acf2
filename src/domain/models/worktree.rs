//! Per-worker isolated git worktree state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single worker's worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    /// `git worktree add` is in flight.
    Creating,
    /// Worktree exists; the worker agent is running inside it.
    Active,
    /// The worker agent has finished; awaiting a merge decision.
    Completed,
    /// A merge attempt is in flight.
    Merging,
    /// Merged into the main working copy; branch deleted.
    Merged,
    /// The worktree or an operation on it failed.
    Failed,
    /// Working directory removed; branch may or may not still exist.
    Removed,
}

impl WorktreeStatus {
    /// Whether this status is the end of the worktree's life — no further
    /// transitions are expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Failed | Self::Removed)
    }
}

/// Per-worker worktree record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    /// The worker id this worktree belongs to.
    pub worker_id: String,
    /// Absolute path to the isolated checkout.
    pub path: String,
    /// Branch name, always `codex-swarm/worker-<worker_id>`.
    pub branch: String,
    /// The ref the worktree was branched from.
    pub base_ref: String,
    /// Current lifecycle status.
    pub status: WorktreeStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status-transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WorktreeInfo {
    /// The fixed branch naming convention: `codex-swarm/worker-<worker_id>`.
    #[must_use]
    pub fn branch_name_for(worker_id: &str) -> String {
        format!("codex-swarm/worker-{worker_id}")
    }

    /// The fixed path naming convention: `<base_dir>/worker-<worker_id>`.
    #[must_use]
    pub fn path_for(base_dir: &str, worker_id: &str) -> String {
        format!("{base_dir}/worker-{worker_id}")
    }

    /// Construct a new worktree record in the `Creating` state.
    #[must_use]
    pub fn new(worker_id: impl Into<String>, base_dir: &str, base_ref: impl Into<String>) -> Self {
        let worker_id = worker_id.into();
        let path = Self::path_for(base_dir, &worker_id);
        let branch = Self::branch_name_for(&worker_id);
        let now = Utc::now();
        Self {
            worker_id,
            path,
            branch,
            base_ref: base_ref.into(),
            status: WorktreeStatus::Creating,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, status: WorktreeStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Mark the worktree as active (creation succeeded).
    pub fn activate(&mut self) {
        self.transition(WorktreeStatus::Active);
    }

    /// Mark the worker agent as finished.
    pub fn complete(&mut self) {
        self.transition(WorktreeStatus::Completed);
    }

    /// Mark a merge attempt as in flight.
    pub fn start_merge(&mut self) {
        self.transition(WorktreeStatus::Merging);
    }

    /// Mark the worktree as merged.
    pub fn merged(&mut self) {
        self.transition(WorktreeStatus::Merged);
    }

    /// Mark the worktree as failed.
    pub fn fail(&mut self) {
        self.transition(WorktreeStatus::Failed);
    }

    /// Mark the working directory as removed.
    pub fn remove(&mut self) {
        self.transition(WorktreeStatus::Removed);
    }

    /// Whether this worktree is safe to garbage-collect.
    #[must_use]
    pub const fn can_cleanup(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_and_path_follow_fixed_convention() {
        assert_eq!(
            WorktreeInfo::branch_name_for("ab12cd34"),
            "codex-swarm/worker-ab12cd34"
        );
        assert_eq!(
            WorktreeInfo::path_for("/tmp/codex-swarm", "ab12cd34"),
            "/tmp/codex-swarm/worker-ab12cd34"
        );
    }

    #[test]
    fn lifecycle_transitions_update_timestamp() {
        let mut wt = WorktreeInfo::new("w1", "/tmp/codex-swarm", "HEAD");
        assert_eq!(wt.status, WorktreeStatus::Creating);
        wt.activate();
        assert_eq!(wt.status, WorktreeStatus::Active);
        wt.complete();
        assert_eq!(wt.status, WorktreeStatus::Completed);
        wt.start_merge();
        assert_eq!(wt.status, WorktreeStatus::Merging);
        wt.merged();
        assert_eq!(wt.status, WorktreeStatus::Merged);
        assert!(wt.can_cleanup());
    }

    #[test]
    fn non_terminal_status_cannot_cleanup() {
        let wt = WorktreeInfo::new("w1", "/tmp/codex-swarm", "HEAD");
        assert!(!wt.can_cleanup());
    }
}
