//! `git`-backed implementation of `VcsDriver`, shelling out to the system
//! `git` binary the way the teacher's worktree service does.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::instrument;

use crate::domain::ports::{MergeStrategy, VcsDriver, VcsOutput};

/// Runs `git` against a fixed repository root, as either the main working
/// copy or from within one of its worktrees (git resolves worktree-relative
/// commands against the worktree's own checkout automatically).
#[derive(Debug, Clone)]
pub struct GitVcsDriver {
    repo_root: String,
}

impl GitVcsDriver {
    /// Build a driver rooted at `repo_root` (the main working copy).
    #[must_use]
    pub fn new(repo_root: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    async fn git(&self, dir: &str, args: &[&str]) -> anyhow::Result<VcsOutput> {
        let output = Command::new("git")
            .current_dir(dir)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(VcsOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn git_main(&self, args: &[&str]) -> anyhow::Result<VcsOutput> {
        self.git(&self.repo_root, args).await
    }
}

#[async_trait]
impl VcsDriver for GitVcsDriver {
    #[instrument(skip(self), fields(branch = %branch))]
    async fn create_worktree(
        &self,
        path: &str,
        branch: &str,
        base_ref: &str,
    ) -> anyhow::Result<VcsOutput> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.git_main(&["worktree", "add", "-b", branch, path, base_ref])
            .await
    }

    #[instrument(skip(self, message))]
    async fn commit_all(
        &self,
        worktree_path: &str,
        author_name: &str,
        author_email: &str,
        message: &str,
    ) -> anyhow::Result<VcsOutput> {
        let status = self.git(worktree_path, &["status", "--porcelain"]).await?;
        if status.stdout.trim().is_empty() {
            return Ok(VcsOutput {
                success: true,
                stdout: "nothing to commit".to_string(),
                stderr: String::new(),
            });
        }
        self.git(worktree_path, &["add", "-A"]).await?;
        let author = format!("{author_name} <{author_email}>");
        self.git(
            worktree_path,
            &["commit", "--author", &author, "-m", message],
        )
        .await
    }

    async fn diff(&self, range: &str) -> anyhow::Result<String> {
        Ok(self.git_main(&["diff", range]).await?.stdout)
    }

    async fn diff_name_only(&self, range: &str) -> anyhow::Result<Vec<String>> {
        let out = self.git_main(&["diff", "--name-only", range]).await?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip(self, message))]
    async fn merge(
        &self,
        branch: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> anyhow::Result<VcsOutput> {
        let mut args = vec!["merge", "--no-ff"];
        match strategy {
            MergeStrategy::Abort => {}
            MergeStrategy::Ours => args.extend(["-X", "ours"]),
            MergeStrategy::Theirs => args.extend(["-X", "theirs"]),
        }
        args.extend(["-m", message, branch]);
        self.git_main(&args).await
    }

    async fn merge_abort(&self) -> anyhow::Result<()> {
        self.git_main(&["merge", "--abort"]).await?;
        Ok(())
    }

    async fn delete_branch(&self, branch: &str, force: bool) -> anyhow::Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.git_main(&["branch", flag, branch]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_worktree(&self, path: &str, force: bool) -> anyhow::Result<()> {
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(path);
        let result = self.git_main(&args).await?;
        if !result.success && !force {
            let mut retry = vec!["worktree", "remove", "--force"];
            retry.push(path);
            self.git_main(&retry).await?;
        }
        if Path::new(path).exists() {
            let _ = tokio::fs::remove_dir_all(path).await;
        }
        Ok(())
    }

    async fn is_valid_worktree(&self, path: &str) -> bool {
        let dot_git = Path::new(path).join(".git");
        if !dot_git.is_file() {
            return false;
        }
        self.git(path, &["rev-parse", "--git-dir"])
            .await
            .map(|o| o.success)
            .unwrap_or(false)
    }

    async fn status_porcelain(&self) -> anyhow::Result<String> {
        Ok(self.git_main(&["status", "--porcelain"]).await?.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio as StdStdio;
    use tokio::process::Command as TokioCommand;

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q", "-b", "main"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            TokioCommand::new("git")
                .current_dir(dir)
                .args(&args)
                .stdout(StdStdio::null())
                .stderr(StdStdio::null())
                .status()
                .await
                .unwrap();
        }
        tokio::fs::write(dir.join("README.md"), "hello\n")
            .await
            .unwrap();
        TokioCommand::new("git")
            .current_dir(dir)
            .args(["add", "-A"])
            .status()
            .await
            .unwrap();
        TokioCommand::new("git")
            .current_dir(dir)
            .args(["commit", "-q", "-m", "init"])
            .status()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_worktree_then_diff_name_only_reflects_changes() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        let driver = GitVcsDriver::new(repo.path().to_string_lossy().to_string());

        let wt_path = repo.path().join("wt-1");
        let wt_path_str = wt_path.to_string_lossy().to_string();
        let out = driver
            .create_worktree(&wt_path_str, "codex-swarm/worker-w1", "main")
            .await
            .unwrap();
        assert!(out.success, "stderr: {}", out.stderr);

        tokio::fs::write(wt_path.join("new_file.txt"), "content\n")
            .await
            .unwrap();
        let commit = driver
            .commit_all(&wt_path_str, "Codex Swarm", "codex-swarm@local", "feat(worker): w1 test")
            .await
            .unwrap();
        assert!(commit.success, "stderr: {}", commit.stderr);

        let changed = driver
            .diff_name_only("main..codex-swarm/worker-w1")
            .await
            .unwrap();
        assert_eq!(changed, vec!["new_file.txt".to_string()]);
    }

    #[tokio::test]
    async fn commit_all_on_clean_worktree_is_a_no_op() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        let driver = GitVcsDriver::new(repo.path().to_string_lossy().to_string());
        let wt_path = repo.path().join("wt-2");
        let wt_path_str = wt_path.to_string_lossy().to_string();
        driver
            .create_worktree(&wt_path_str, "codex-swarm/worker-w2", "main")
            .await
            .unwrap();

        let commit = driver
            .commit_all(&wt_path_str, "Codex Swarm", "codex-swarm@local", "feat(worker): w2 noop")
            .await
            .unwrap();
        assert!(commit.success);
        assert_eq!(commit.stdout, "nothing to commit");
    }
}
