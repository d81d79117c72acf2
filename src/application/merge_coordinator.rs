//! Serialized branch merging, the approval gate, and the auto-merge policy
//! (spec §4.5).

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use crate::domain::models::{EventPayload, MergeOutcome, ResolveConflicts, WorkerStatus};
use crate::domain::ports::{MergeStrategy, VcsDriver};

use super::event_bus::EventBus;
use super::worktree_allocator::WorktreeAllocator;

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn to_vcs_strategy(resolve: ResolveConflicts) -> MergeStrategy {
    match resolve {
        ResolveConflicts::Abort => MergeStrategy::Abort,
        ResolveConflicts::Ours => MergeStrategy::Ours,
        ResolveConflicts::Theirs => MergeStrategy::Theirs,
    }
}

/// Serializes every merge attempt against the main working copy behind a
/// single mutex, and tracks which workers are awaiting explicit approval.
pub struct MergeCoordinator {
    vcs: Arc<dyn VcsDriver>,
    allocator: Arc<WorktreeAllocator>,
    events: Arc<EventBus>,
    merge_mutex: Mutex<()>,
    pending_approval: RwLock<BTreeSet<String>>,
    auto_merge: bool,
}

impl MergeCoordinator {
    /// Build a coordinator. `auto_merge` mirrors `worktree.auto_merge`.
    #[must_use]
    pub fn new(
        vcs: Arc<dyn VcsDriver>,
        allocator: Arc<WorktreeAllocator>,
        events: Arc<EventBus>,
        auto_merge: bool,
    ) -> Self {
        Self {
            vcs,
            allocator,
            events,
            merge_mutex: Mutex::new(()),
            pending_approval: RwLock::new(BTreeSet::new()),
            auto_merge,
        }
    }

    /// The sorted pending-approval worker ids.
    pub async fn pending_approval(&self) -> Vec<String> {
        self.pending_approval.read().await.iter().cloned().collect()
    }

    /// Merge `branch` into the main working copy. Every call is serialized
    /// by `merge_mutex` so no two merges ever overlap (spec §5).
    #[instrument(skip(self, task_summary))]
    pub async fn merge_branch(
        &self,
        worker_id: &str,
        branch: &str,
        task_summary: &str,
        resolve: ResolveConflicts,
    ) -> MergeOutcome {
        let _guard = self.merge_mutex.lock().await;
        let message = format!(
            "chore(codex-swarm): merge {worker_id} - {}",
            truncate(task_summary, 72)
        );
        let strategy = to_vcs_strategy(resolve);
        let outcome = match self.vcs.merge(branch, strategy, &message).await {
            Ok(result) if result.success => MergeOutcome {
                worker_id: worker_id.to_string(),
                branch: branch.to_string(),
                merged: true,
                conflict: false,
                message: result.stdout,
            },
            Ok(result) => {
                let _ = self.vcs.merge_abort().await;
                let message = if !result.stderr.trim().is_empty() {
                    result.stderr
                } else if !result.stdout.trim().is_empty() {
                    result.stdout
                } else {
                    "merge conflict".to_string()
                };
                MergeOutcome {
                    worker_id: worker_id.to_string(),
                    branch: branch.to_string(),
                    merged: false,
                    conflict: true,
                    message,
                }
            }
            Err(e) => {
                let _ = self.vcs.merge_abort().await;
                MergeOutcome {
                    worker_id: worker_id.to_string(),
                    branch: branch.to_string(),
                    merged: false,
                    conflict: true,
                    message: e.to_string(),
                }
            }
        };
        self.events.publish(EventPayload::WorkerMerged {
            worker_id: worker_id.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Apply the four-step auto-merge decision tree after a worker
    /// completes (spec §4.5). Always releases the worktree working
    /// directory; branch survival depends on the outcome.
    pub async fn apply_auto_merge_policy(
        &self,
        worker_id: &str,
        branch: &str,
        worktree_path: &str,
        status: WorkerStatus,
        requires_approval: bool,
        task_summary: &str,
        cleanup: bool,
    ) -> MergeOutcome {
        if !self.auto_merge {
            self.allocator.release(worktree_path, branch, false, cleanup).await;
            return MergeOutcome {
                worker_id: worker_id.to_string(),
                branch: branch.to_string(),
                merged: false,
                conflict: false,
                message: "auto_merge disabled".to_string(),
            };
        }

        if requires_approval {
            self.pending_approval.write().await.insert(worker_id.to_string());
            self.allocator.release(worktree_path, branch, false, cleanup).await;
            return MergeOutcome {
                worker_id: worker_id.to_string(),
                branch: branch.to_string(),
                merged: false,
                conflict: false,
                message: "pending_supervisor_approval".to_string(),
            };
        }

        if status != WorkerStatus::Completed {
            self.allocator.release(worktree_path, branch, false, cleanup).await;
            return MergeOutcome {
                worker_id: worker_id.to_string(),
                branch: branch.to_string(),
                merged: false,
                conflict: false,
                message: format!("{status:?}"),
            };
        }

        let outcome = self
            .merge_branch(worker_id, branch, task_summary, ResolveConflicts::Abort)
            .await;
        self.allocator
            .release(worktree_path, branch, outcome.merged, cleanup)
            .await;
        outcome
    }

    /// Handle an explicit `merge_results` dispatch: merge each named worker
    /// (defaulting to the sorted pending-approval set), removing any that
    /// merge successfully from that set.
    pub async fn merge_results(
        &self,
        worker_ids: Option<Vec<String>>,
        resolve: ResolveConflicts,
        lookup: impl Fn(&str) -> Option<(String, String, String)>,
        cleanup: bool,
    ) -> Vec<MergeOutcome> {
        let ids = match worker_ids {
            Some(ids) => ids,
            None => self.pending_approval().await,
        };
        let mut outcomes = Vec::new();
        for worker_id in ids {
            let Some((branch, worktree_path, task_summary)) = lookup(&worker_id) else {
                continue;
            };
            let outcome = self
                .merge_branch(&worker_id, &branch, &task_summary, resolve)
                .await;
            if outcome.merged {
                self.pending_approval.write().await.remove(&worker_id);
                self.allocator
                    .release(&worktree_path, &branch, true, cleanup)
                    .await;
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::VcsOutput;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeVcs {
        merge_calls: StdMutex<Vec<String>>,
        fail_merge: bool,
    }

    #[async_trait]
    impl VcsDriver for FakeVcs {
        async fn create_worktree(&self, _: &str, _: &str, _: &str) -> anyhow::Result<VcsOutput> {
            Ok(VcsOutput { success: true, stdout: String::new(), stderr: String::new() })
        }
        async fn commit_all(&self, _: &str, _: &str, _: &str, _: &str) -> anyhow::Result<VcsOutput> {
            Ok(VcsOutput { success: true, stdout: String::new(), stderr: String::new() })
        }
        async fn diff(&self, _: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }
        async fn diff_name_only(&self, _: &str) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn merge(&self, branch: &str, _: MergeStrategy, _: &str) -> anyhow::Result<VcsOutput> {
            self.merge_calls.lock().unwrap().push(branch.to_string());
            if self.fail_merge {
                Ok(VcsOutput { success: false, stdout: String::new(), stderr: "CONFLICT".to_string() })
            } else {
                Ok(VcsOutput { success: true, stdout: "merged".to_string(), stderr: String::new() })
            }
        }
        async fn merge_abort(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_branch(&self, _: &str, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn remove_worktree(&self, _: &str, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn is_valid_worktree(&self, _: &str) -> bool {
            true
        }
        async fn status_porcelain(&self) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn coordinator(fail_merge: bool) -> MergeCoordinator {
        let vcs: Arc<dyn VcsDriver> = Arc::new(FakeVcs { fail_merge, ..Default::default() });
        let allocator = Arc::new(WorktreeAllocator::new(vcs.clone(), "/tmp/codex-swarm"));
        let events = Arc::new(EventBus::default());
        MergeCoordinator::new(vcs, allocator, events, true)
    }

    #[tokio::test]
    async fn successful_merge_reports_merged_true() {
        let coordinator = coordinator(false);
        let outcome = coordinator
            .merge_branch("w1", "codex-swarm/worker-w1", "did the thing", ResolveConflicts::Abort)
            .await;
        assert!(outcome.merged);
        assert!(!outcome.conflict);
    }

    #[tokio::test]
    async fn conflicting_merge_reports_conflict_and_aborts() {
        let coordinator = coordinator(true);
        let outcome = coordinator
            .merge_branch("w1", "codex-swarm/worker-w1", "did the thing", ResolveConflicts::Abort)
            .await;
        assert!(!outcome.merged);
        assert!(outcome.conflict);
    }

    #[tokio::test]
    async fn requires_approval_worker_is_added_to_pending_set_not_merged() {
        let coordinator = coordinator(false);
        let outcome = coordinator
            .apply_auto_merge_policy(
                "w1",
                "codex-swarm/worker-w1",
                "/tmp/codex-swarm/worker-w1",
                WorkerStatus::PendingApproval,
                true,
                "summary",
                true,
            )
            .await;
        assert!(!outcome.merged);
        assert_eq!(coordinator.pending_approval().await, vec!["w1".to_string()]);
    }

    #[tokio::test]
    async fn non_completed_status_skips_merge_without_pending_approval() {
        let coordinator = coordinator(false);
        let outcome = coordinator
            .apply_auto_merge_policy(
                "w1",
                "codex-swarm/worker-w1",
                "/tmp/codex-swarm/worker-w1",
                WorkerStatus::Failed,
                false,
                "summary",
                true,
            )
            .await;
        assert!(!outcome.merged);
        assert!(coordinator.pending_approval().await.is_empty());
    }

    #[tokio::test]
    async fn auto_merge_disabled_never_merges() {
        let vcs: Arc<dyn VcsDriver> = Arc::new(FakeVcs::default());
        let allocator = Arc::new(WorktreeAllocator::new(vcs.clone(), "/tmp/codex-swarm"));
        let events = Arc::new(EventBus::default());
        let coordinator = MergeCoordinator::new(vcs, allocator, events, false);
        let outcome = coordinator
            .apply_auto_merge_policy(
                "w1",
                "codex-swarm/worker-w1",
                "/tmp/codex-swarm/worker-w1",
                WorkerStatus::Completed,
                false,
                "summary",
                true,
            )
            .await;
        assert!(!outcome.merged);
    }
}
