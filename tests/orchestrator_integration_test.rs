//! End-to-end integration test driving the real `git` binary through a
//! `GitVcsDriver`, with a fake `AgentRunner` standing in for the opaque
//! agent CLI binary (spec §1's external collaborator).
//!
//! This exercises the full path a real run takes: supervisor output ->
//! dispatch-block extraction -> worker spawn -> worktree -> commit -> diff
//! -> auto-merge -> response file, without needing the real `codex` binary.

use std::path::Path;
use std::process::Stdio as StdStdio;
use std::sync::Arc;

use async_trait::async_trait;
use codex_swarm::adapters::GitVcsDriver;
use codex_swarm::application::{Orchestrator, RequestHandler};
use codex_swarm::domain::error::WorkerError;
use codex_swarm::domain::models::AppConfig;
use codex_swarm::domain::ports::{AgentLine, AgentOutcome, AgentRunner, AgentSpawnRequest};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

async fn init_repo(dir: &Path) {
    for args in [
        vec!["init", "-q", "-b", "main"],
        vec!["config", "user.email", "test@example.com"],
        vec!["config", "user.name", "Test"],
    ] {
        Command::new("git")
            .current_dir(dir)
            .args(&args)
            .stdout(StdStdio::null())
            .stderr(StdStdio::null())
            .status()
            .await
            .unwrap();
    }
    tokio::fs::write(dir.join("README.md"), "hello\n").await.unwrap();
    Command::new("git")
        .current_dir(dir)
        .args(["add", "-A"])
        .status()
        .await
        .unwrap();
    Command::new("git")
        .current_dir(dir)
        .args(["commit", "-q", "-m", "init"])
        .status()
        .await
        .unwrap();
}

/// Stands in for the opaque agent CLI binary: the supervisor invocation
/// emits one `spawn_agent` dispatch block, and every worker invocation
/// writes the worker result contract file into its own worktree before
/// reporting success.
struct FakeAgentRunner;

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn run(&self, request: AgentSpawnRequest) -> Result<AgentOutcome, WorkerError> {
        let result_path = Path::new(&request.work_dir).join(".codex-worker-result.json");
        tokio::fs::write(
            &result_path,
            r#"{"status": "success", "summary": "added a line to README", "files_modified": ["README.md"], "confidence": 0.9}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(
            Path::new(&request.work_dir).join("README.md"),
            "hello\nextra line\n",
        )
        .await
        .unwrap();
        Ok(AgentOutcome {
            exit_code: 0,
            timed_out: false,
            raw_stdout: String::new(),
            raw_stderr: String::new(),
            lines: Vec::new(),
        })
    }

    async fn run_streaming(
        &self,
        request: AgentSpawnRequest,
        sink: UnboundedSender<AgentLine>,
    ) -> Result<AgentOutcome, WorkerError> {
        let message = AgentLine::AgentMessage {
            text: "```spawn_agent\n{\"task\": \"append a line to README\", \"request_id\": \"corr-1\"}\n```"
                .to_string(),
        };
        let _ = sink.send(message);
        self.run(request).await
    }

    async fn kill(&self, _handle: &str) -> bool {
        false
    }

    async fn is_running(&self, _handle: &str) -> bool {
        false
    }

    async fn running_handles(&self) -> Vec<String> {
        Vec::new()
    }
}

#[tokio::test]
async fn spawn_agent_dispatch_runs_a_worker_and_auto_merges() {
    let repo = tempfile::tempdir().unwrap();
    init_repo(repo.path()).await;
    let repo_root = repo.path().to_string_lossy().into_owned();

    let base_dir = repo.path().join(".codex-swarm-worktrees");
    let mut config = AppConfig::default();
    config.worktree.base_dir = base_dir.to_string_lossy().into_owned();
    config.swarm.max_workers = 2;

    let vcs = Arc::new(GitVcsDriver::new(repo_root.clone()));
    let agent_runner = Arc::new(FakeAgentRunner);
    let orchestrator = Orchestrator::new(config, vcs, agent_runner).with_repo_root(repo_root.clone());

    orchestrator.start().await.expect("orchestrator should start cleanly");

    let exit_code = orchestrator
        .run_supervisor("add a short note to the README".to_string())
        .await
        .expect("supervisor run should succeed");
    assert_eq!(exit_code, 0);

    let response_path = Path::new(&repo_root).join(".codex-swarm-response.md");
    let response = tokio::fs::read_to_string(&response_path)
        .await
        .expect("response file should have been written");
    assert!(response.contains("codex-swarm-response:corr-1:start"));
    assert!(response.contains("added a line to README"));

    let readme = tokio::fs::read_to_string(repo.path().join("README.md")).await.unwrap();
    assert!(
        readme.contains("extra line"),
        "worker's change should have been merged into the main working copy"
    );

    let reply = orchestrator
        .handle_request("check_workers", serde_json::json!({}))
        .await
        .expect("check_workers should succeed");
    let workers = reply["workers"].as_array().expect("workers array");
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["status"], "completed");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn out_of_scope_worker_requires_approval_and_is_not_auto_merged() {
    let repo = tempfile::tempdir().unwrap();
    init_repo(repo.path()).await;
    let repo_root = repo.path().to_string_lossy().into_owned();

    struct ScopeViolatingRunner;

    #[async_trait]
    impl AgentRunner for ScopeViolatingRunner {
        async fn run(&self, request: AgentSpawnRequest) -> Result<AgentOutcome, WorkerError> {
            tokio::fs::write(
                Path::new(&request.work_dir).join(".codex-worker-result.json"),
                r#"{"status": "success", "summary": "touched an extra file", "files_modified": ["README.md", "other.txt"], "confidence": 0.8}"#,
            )
            .await
            .unwrap();
            tokio::fs::write(Path::new(&request.work_dir).join("other.txt"), "oops\n")
                .await
                .unwrap();
            Ok(AgentOutcome {
                exit_code: 0,
                timed_out: false,
                raw_stdout: String::new(),
                raw_stderr: String::new(),
                lines: Vec::new(),
            })
        }

        async fn run_streaming(
            &self,
            request: AgentSpawnRequest,
            sink: UnboundedSender<AgentLine>,
        ) -> Result<AgentOutcome, WorkerError> {
            let _ = sink.send(AgentLine::AgentMessage {
                text: "```spawn_agent\n{\"task\": \"edit only docs\", \"scope\": [\"docs/**\"]}\n```".to_string(),
            });
            self.run(request).await
        }

        async fn kill(&self, _handle: &str) -> bool {
            false
        }

        async fn is_running(&self, _handle: &str) -> bool {
            false
        }

        async fn running_handles(&self) -> Vec<String> {
            Vec::new()
        }
    }

    let mut config = AppConfig::default();
    config.worktree.base_dir = repo.path().join(".codex-swarm-worktrees").to_string_lossy().into_owned();

    let vcs = Arc::new(GitVcsDriver::new(repo_root.clone()));
    let orchestrator =
        Orchestrator::new(config, vcs, Arc::new(ScopeViolatingRunner)).with_repo_root(repo_root.clone());
    orchestrator.start().await.unwrap();
    orchestrator
        .run_supervisor("edit only docs".to_string())
        .await
        .unwrap();

    assert!(!repo.path().join("other.txt").exists(), "out-of-scope change must stay unmerged");

    let reply = orchestrator
        .handle_request("check_workers", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(reply["pending_approval"].as_array().unwrap().len(), 1);
}
