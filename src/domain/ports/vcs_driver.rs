//! The `VcsDriver` capability: the narrow set of version-control primitives
//! the orchestrator needs (spec §1). The version-control tool itself is an
//! external collaborator; this port exists so the application layer can be
//! tested against an in-memory fake instead of a real `git` checkout.

use async_trait::async_trait;

/// Conflict-resolution strategy for a merge, per spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Plain `--no-ff` merge; abort on any conflict.
    Abort,
    /// `--no-ff -X ours`.
    Ours,
    /// `--no-ff -X theirs`.
    Theirs,
}

/// The outcome of a single VCS command invocation.
#[derive(Debug, Clone)]
pub struct VcsOutput {
    /// Whether the command exited zero.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Narrow capability over a single main working copy plus its worker worktrees.
#[async_trait]
pub trait VcsDriver: Send + Sync {
    /// Create an isolated worktree at `path` on a new branch `branch`,
    /// based on `base_ref`. Equivalent to `git worktree add -b <branch>
    /// <path> <base_ref>`.
    async fn create_worktree(
        &self,
        path: &str,
        branch: &str,
        base_ref: &str,
    ) -> anyhow::Result<VcsOutput>;

    /// Stage and commit every uncommitted change in `worktree_path` under
    /// the given author identity. A clean worktree is a no-op that still
    /// reports success.
    async fn commit_all(
        &self,
        worktree_path: &str,
        author_name: &str,
        author_email: &str,
        message: &str,
    ) -> anyhow::Result<VcsOutput>;

    /// Unified diff of `range` (e.g. `"HEAD..branch"`) against the main
    /// working copy.
    async fn diff(&self, range: &str) -> anyhow::Result<String>;

    /// `git diff --name-only` over `range`.
    async fn diff_name_only(&self, range: &str) -> anyhow::Result<Vec<String>>;

    /// Merge `branch` into the main working copy's current branch.
    async fn merge(
        &self,
        branch: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> anyhow::Result<VcsOutput>;

    /// Abort an in-progress merge (`git merge --abort`).
    async fn merge_abort(&self) -> anyhow::Result<()>;

    /// Delete a local branch. Non-fatal if the branch is unmerged; the
    /// caller decides whether to force.
    async fn delete_branch(&self, branch: &str, force: bool) -> anyhow::Result<()>;

    /// Remove a worktree working directory (`git worktree remove`).
    async fn remove_worktree(&self, path: &str, force: bool) -> anyhow::Result<()>;

    /// Whether `path` is a valid, live worktree of the main repository.
    async fn is_valid_worktree(&self, path: &str) -> bool;

    /// `git status --porcelain` on the main working copy; empty means clean.
    async fn status_porcelain(&self) -> anyhow::Result<String>;
}
