//! Child-process implementation of `AgentRunner`: spawns the opaque agent
//! CLI binary, streams its stdout/stderr concurrently, and enforces a
//! wall-clock timeout via `SIGKILL`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, RwLock};
use tracing::{instrument, warn};

use crate::domain::error::WorkerError;
use crate::domain::models::TokenUsage;
use crate::domain::ports::{AgentLine, AgentOutcome, AgentRunner, AgentSpawnRequest};

/// Exit code sentinel for a timeout kill, per spec §5.
const TIMEOUT_EXIT_CODE: i32 = -9;

/// A tracked in-flight process: its pid, for signalling, and an `exited`
/// watch that flips to `true` once `run_inner`'s own `child.wait()` returns,
/// however the process ended (normal exit, internal timeout, or an external
/// `kill()`).
#[derive(Debug, Clone)]
struct TrackedProcess {
    pid: u32,
    exited: watch::Receiver<bool>,
}

/// Spawns the agent binary as a child process and tracks live PIDs by
/// caller-supplied handle so `kill()` can target an in-flight invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessAgentRunner {
    running: Arc<RwLock<HashMap<String, TrackedProcess>>>,
}

impl ProcessAgentRunner {
    /// Build an empty runner with no tracked processes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_line(line: &str) -> Option<AgentLine> {
        let value: Value = serde_json::from_str(line).ok()?;
        let event_type = value.get("type")?.as_str()?;
        match event_type {
            "item.completed" => {
                let item = value.get("item")?;
                if item.get("type")?.as_str()? != "agent_message" {
                    return None;
                }
                let text = item.get("text")?.as_str()?.to_string();
                Some(AgentLine::AgentMessage { text })
            }
            "turn.completed" => {
                let usage = value.get("usage")?;
                Some(AgentLine::Usage {
                    usage: TokenUsage {
                        input_tokens: usage.get("input_tokens")?.as_u64()?,
                        cached_input_tokens: usage
                            .get("cached_input_tokens")
                            .and_then(Value::as_u64)
                            .unwrap_or(0),
                        output_tokens: usage.get("output_tokens")?.as_u64()?,
                    },
                })
            }
            _ => None,
        }
    }

    async fn run_inner(
        &self,
        request: AgentSpawnRequest,
        sink: Option<tokio::sync::mpsc::UnboundedSender<AgentLine>>,
    ) -> Result<AgentOutcome, WorkerError> {
        let mut args: Vec<String> = vec![
            "-a".to_string(),
            request.approval_mode.clone(),
            "exec".to_string(),
            "--json".to_string(),
        ];
        if let Some(model) = &request.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        args.push("--cd".to_string());
        args.push(request.work_dir.clone());
        args.push(request.prompt.clone());

        let mut child = Command::new(&request.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WorkerError::Worktree {
                worker_id: request.handle.clone(),
                source: anyhow::anyhow!("failed to spawn {}: {e}", request.binary),
            })?;

        let (exited_tx, exited_rx) = watch::channel(false);
        if let Some(pid) = child.id() {
            self.running
                .write()
                .await
                .insert(request.handle.clone(), TrackedProcess { pid, exited: exited_rx });
        }

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let stdout_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            let mut raw = String::new();
            let mut lines = Vec::new();
            while let Ok(Some(line)) = reader.next_line().await {
                raw.push_str(&line);
                raw.push('\n');
                if let Some(parsed) = ProcessAgentRunner::parse_line(&line) {
                    if let Some(sink) = &sink {
                        let _ = sink.send(parsed.clone());
                    }
                    lines.push(parsed);
                }
            }
            (raw, lines)
        });
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut raw = String::new();
            while let Ok(Some(line)) = reader.next_line().await {
                raw.push_str(&line);
                raw.push('\n');
            }
            raw
        });

        let wait_result = tokio::time::timeout(request.timeout, child.wait()).await;

        let (raw_stdout, lines) = stdout_task.await.unwrap_or_default();
        let mut raw_stderr = stderr_task.await.unwrap_or_default();

        let outcome = match wait_result {
            Ok(Ok(status)) => AgentOutcome {
                exit_code: status.code().unwrap_or(-1),
                timed_out: false,
                raw_stdout,
                raw_stderr,
                lines,
            },
            Ok(Err(e)) => {
                self.running.write().await.remove(&request.handle);
                let _ = exited_tx.send(true);
                return Err(WorkerError::Worktree {
                    worker_id: request.handle.clone(),
                    source: anyhow::anyhow!("failed to await child: {e}"),
                });
            }
            Err(_) => {
                if let Some(pid) = child.id() {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
                let _ = child.wait().await;
                raw_stderr.push_str("codex-swarm: agent timed out\n");
                AgentOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    timed_out: true,
                    raw_stdout,
                    raw_stderr,
                    lines,
                }
            }
        };

        self.running.write().await.remove(&request.handle);
        let _ = exited_tx.send(true);
        Ok(outcome)
    }
}

#[async_trait]
impl AgentRunner for ProcessAgentRunner {
    #[instrument(skip(self, request), fields(handle = %request.handle, work_dir = %request.work_dir))]
    async fn run(&self, request: AgentSpawnRequest) -> Result<AgentOutcome, WorkerError> {
        self.run_inner(request, None).await
    }

    #[instrument(skip(self, request, sink), fields(handle = %request.handle, work_dir = %request.work_dir))]
    async fn run_streaming(
        &self,
        request: AgentSpawnRequest,
        sink: tokio::sync::mpsc::UnboundedSender<AgentLine>,
    ) -> Result<AgentOutcome, WorkerError> {
        self.run_inner(request, Some(sink)).await
    }

    async fn kill(&self, handle: &str) -> bool {
        let tracked = self.running.read().await.get(handle).cloned();
        let Some(TrackedProcess { pid, mut exited }) = tracked else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                // `run_inner`'s own `child.wait()` does the reaping; wait for
                // it to flip this watch rather than reaping a second time.
                let _ = exited.wait_for(|done| *done).await;
                true
            }
            Err(e) => {
                warn!(%handle, error = %e, "failed to signal process");
                false
            }
        }
    }

    async fn is_running(&self, handle: &str) -> bool {
        self.running.read().await.contains_key(handle)
    }

    async fn running_handles(&self) -> Vec<String> {
        self.running.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_message_line() {
        let line = r#"{"type":"item.completed","item":{"type":"agent_message","text":"hello"}}"#;
        match ProcessAgentRunner::parse_line(line) {
            Some(AgentLine::AgentMessage { text }) => assert_eq!(text, "hello"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_usage_line() {
        let line = r#"{"type":"turn.completed","usage":{"input_tokens":10,"cached_input_tokens":2,"output_tokens":5}}"#;
        match ProcessAgentRunner::parse_line(line) {
            Some(AgentLine::Usage { usage }) => {
                assert_eq!(usage.input_tokens, 10);
                assert_eq!(usage.cached_input_tokens, 2);
                assert_eq!(usage.output_tokens, 5);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ignores_unrecognized_line_shapes() {
        assert!(ProcessAgentRunner::parse_line(r#"{"type":"session.created"}"#).is_none());
        assert!(ProcessAgentRunner::parse_line("not json").is_none());
    }

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let runner = ProcessAgentRunner::new();
        let request = AgentSpawnRequest {
            handle: "w1".to_string(),
            binary: "true".to_string(),
            approval_mode: "on-request".to_string(),
            model: None,
            work_dir: "/tmp".to_string(),
            prompt: "ignored".to_string(),
            timeout: std::time::Duration::from_secs(5),
        };
        // `true -a ... exec --json ...` will fail to parse its own args, but
        // it still exits 0 — this exercises the plumbing, not the real binary.
        let outcome = runner.run(request).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn kill_waits_for_the_process_to_actually_exit() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("pid");

        let runner = ProcessAgentRunner::new();
        let (exited_tx, exited_rx) = watch::channel(false);
        runner
            .running
            .write()
            .await
            .insert("w1".to_string(), TrackedProcess { pid, exited: exited_rx });

        // Stands in for `run_inner`'s own `child.wait()` reaping the process
        // concurrently with the `kill()` call below.
        let reaper = tokio::spawn(async move {
            let _ = child.wait().await;
            let _ = exited_tx.send(true);
        });

        assert!(runner.kill("w1").await);
        reaper.await.expect("reaper task should not panic");
    }
}
