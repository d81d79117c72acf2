//! The `AgentRunner` capability: spawning the opaque agent CLI binary and
//! streaming its line-delimited JSON event stream back to the caller.
//!
//! The binary itself is an external collaborator (spec §1) — this port only
//! names the shape of the interaction: invocation arguments, the two line
//! events the core assigns meaning to, and timeout/kill semantics.

use async_trait::async_trait;

use crate::domain::error::WorkerError;
use crate::domain::models::TokenUsage;

/// Parameters for a single agent invocation (supervisor or worker).
#[derive(Debug, Clone)]
pub struct AgentSpawnRequest {
    /// Caller-chosen handle (worker id, or `"supervisor"`) used to target
    /// this invocation with a later `kill` call.
    pub handle: String,
    /// Path (or bare name, resolved via `PATH`) of the agent CLI binary.
    pub binary: String,
    /// Value passed to `-a`.
    pub approval_mode: String,
    /// Value passed to `-m`, when set.
    pub model: Option<String>,
    /// Value passed to `--cd`; the directory the agent operates in.
    pub work_dir: String,
    /// The trailing prompt argument.
    pub prompt: String,
    /// Wall-clock timeout before the child is SIGKILLed.
    pub timeout: std::time::Duration,
}

/// A single semantic line extracted from the child's stdout stream, per
/// spec §4.1/§6. Lines that match neither shape are captured into the raw
/// buffer but produce no `AgentLine`.
#[derive(Debug, Clone)]
pub enum AgentLine {
    /// An `item.completed` event whose inner `item.type == "agent_message"`.
    AgentMessage {
        /// The message text, fed back through dispatch-block extraction.
        text: String,
    },
    /// A `turn.completed` event carrying a usage delta.
    Usage {
        /// The token-usage delta reported for this turn.
        usage: TokenUsage,
    },
}

/// The terminal outcome of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Process exit code. `-9` marks a timeout kill, per spec §5.
    pub exit_code: i32,
    /// Whether the invocation was killed after exceeding its timeout.
    pub timed_out: bool,
    /// Complete captured stdout.
    pub raw_stdout: String,
    /// Complete captured stderr.
    pub raw_stderr: String,
    /// Every `AgentLine` extracted from stdout, in arrival order.
    pub lines: Vec<AgentLine>,
}

/// Spawns the opaque agent CLI binary and reports its outcome.
///
/// Implementations stream stdout/stderr concurrently and MUST NOT block the
/// caller beyond the requested timeout; on expiry they send SIGKILL and
/// still return an `AgentOutcome` (never a timeout error) per spec §4.2's
/// failure model: timeouts are a distinguished outcome, not a raised error.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run one invocation to completion (or until its timeout expires).
    async fn run(&self, request: AgentSpawnRequest) -> Result<AgentOutcome, WorkerError>;

    /// Run one invocation, forwarding each `AgentLine` to `sink` as soon as
    /// it is parsed from stdout, in addition to returning the same terminal
    /// `AgentOutcome` as `run` once the process exits (or times out).
    ///
    /// The supervisor loop needs lines as they arrive so it can extract and
    /// dispatch fenced tool blocks without waiting for the whole stream;
    /// worker invocations have no such requirement and use `run`.
    async fn run_streaming(
        &self,
        request: AgentSpawnRequest,
        sink: tokio::sync::mpsc::UnboundedSender<AgentLine>,
    ) -> Result<AgentOutcome, WorkerError>;

    /// Signal SIGKILL to a previously spawned, still-tracked process and
    /// await its exit before returning.
    ///
    /// Returns `true` iff a live process was found, signalled, and reaped.
    async fn kill(&self, handle: &str) -> bool;

    /// Whether `handle` is currently present in the live-process map.
    ///
    /// This, not the worker's last known lifecycle event, is the source of
    /// truth `check_workers` reports under its `running` field: a worker
    /// whose process already exited reports `running == false` immediately,
    /// even before its terminal `WorkerCompleted` event has propagated.
    async fn is_running(&self, handle: &str) -> bool;

    /// Every handle currently present in the live-process map, in no
    /// particular order.
    ///
    /// `check_workers` unions this with its own worker-id bookkeeping so a
    /// process that is live but not yet reflected anywhere else (a narrow
    /// race between spawn and the caller's own bookkeeping) still surfaces.
    async fn running_handles(&self) -> Vec<String>;
}
