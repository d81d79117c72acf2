//! Per-worker isolated checkout allocation and cleanup (spec §3 lifecycle,
//! §4 `WorktreeAllocator`).

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::error::WorkerError;
use crate::domain::models::WorktreeInfo;
use crate::domain::ports::VcsDriver;

/// Creates and tears down per-worker worktrees under a fixed base directory.
pub struct WorktreeAllocator {
    vcs: Arc<dyn VcsDriver>,
    base_dir: String,
}

impl WorktreeAllocator {
    /// Build an allocator rooted at `base_dir` (spec's `worktree.base_dir`).
    #[must_use]
    pub fn new(vcs: Arc<dyn VcsDriver>, base_dir: impl Into<String>) -> Self {
        Self {
            vcs,
            base_dir: base_dir.into(),
        }
    }

    /// Create a new worktree for `worker_id`, branched from `base_ref`.
    #[instrument(skip(self), fields(worker_id))]
    pub async fn create(&self, worker_id: &str, base_ref: &str) -> Result<WorktreeInfo, WorkerError> {
        let mut info = WorktreeInfo::new(worker_id, &self.base_dir, base_ref);
        let result = self
            .vcs
            .create_worktree(&info.path, &info.branch, base_ref)
            .await
            .map_err(|source| WorkerError::Worktree {
                worker_id: worker_id.to_string(),
                source,
            })?;
        if !result.success {
            return Err(WorkerError::Worktree {
                worker_id: worker_id.to_string(),
                source: anyhow::anyhow!(
                    "git worktree add failed: {}",
                    if result.stderr.is_empty() { result.stdout } else { result.stderr }
                ),
            });
        }
        info.activate();
        Ok(info)
    }

    /// Release a worktree's working directory, optionally deleting its
    /// branch. Cleanup of the directory is unconditional when `cleanup` is
    /// true; branch deletion only happens when `delete_branch` is true
    /// (never for a pending-approval or conflicted worker).
    #[instrument(skip(self))]
    pub async fn release(&self, path: &str, branch: &str, delete_branch: bool, cleanup: bool) {
        if cleanup {
            if let Err(e) = self.vcs.remove_worktree(path, true).await {
                warn!(%branch, error = %e, "failed to remove worktree directory");
            }
        }
        if delete_branch {
            if let Err(e) = self.vcs.delete_branch(branch, false).await {
                warn!(%branch, error = %e, "failed to delete worker branch");
            }
        }
    }

    /// Remove any worktrees left over from a prior run (spec §3: "stale
    /// worktrees from prior runs are removed at orchestrator start").
    #[instrument(skip(self))]
    pub async fn cleanup_stale(&self) -> anyhow::Result<usize> {
        let mut removed = 0usize;
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("worker-") {
                continue;
            }
            let path_str = path.to_string_lossy().to_string();
            let _ = self.vcs.remove_worktree(&path_str, true).await;
            if tokio::fs::remove_dir_all(&path).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, base_dir = %self.base_dir, "removed stale worktrees from prior run");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MergeStrategy, VcsOutput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeVcs {
        created: Mutex<Vec<(String, String, String)>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VcsDriver for FakeVcs {
        async fn create_worktree(&self, path: &str, branch: &str, base_ref: &str) -> anyhow::Result<VcsOutput> {
            self.created
                .lock()
                .unwrap()
                .push((path.to_string(), branch.to_string(), base_ref.to_string()));
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
        async fn merge(&self, _: &str, _: MergeStrategy, _: &str) -> anyhow::Result<VcsOutput> {
            Ok(VcsOutput { success: true, stdout: String::new(), stderr: String::new() })
        }
        async fn merge_abort(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_branch(&self, _: &str, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn remove_worktree(&self, path: &str, _: bool) -> anyhow::Result<()> {
            self.removed.lock().unwrap().push(path.to_string());
            Ok(())
        }
        async fn is_valid_worktree(&self, _: &str) -> bool {
            true
        }
        async fn status_porcelain(&self) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn create_builds_fixed_path_and_branch_names() {
        let vcs = Arc::new(FakeVcs::default());
        let allocator = WorktreeAllocator::new(vcs.clone(), "/tmp/codex-swarm");
        let info = allocator.create("w1", "HEAD").await.unwrap();
        assert_eq!(info.path, "/tmp/codex-swarm/worker-w1");
        assert_eq!(info.branch, "codex-swarm/worker-w1");
        assert_eq!(vcs.created.lock().unwrap().len(), 1);
    }
}
