//! Typed error taxonomy for the orchestrator core.
//!
//! Each component that can fail owns one `thiserror` enum. Components that need
//! to distinguish retryable from terminal failures expose `is_transient`/
//! `is_permanent`; the rest surface as typed outcomes on the event bus rather
//! than propagating, per the error-handling policy each variant documents.

use thiserror::Error;

/// Errors raised while extracting or validating fenced dispatch blocks.
///
/// Per policy, these are always logged and skipped by the caller; they are
/// never propagated to the supervisor loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The fenced block body did not parse as a JSON object, even after the
    /// trailing-comma and quote-style repair passes.
    #[error("dispatch block body is not a JSON object: {0}")]
    NotAnObject(String),

    /// The tool tag on the fenced block is not one of the four known tools.
    #[error("unknown dispatch tool tag: {0}")]
    UnknownTool(String),

    /// The payload failed schema validation after normalization.
    #[error("dispatch payload failed validation: {0}")]
    InvalidPayload(String),
}

/// Errors raised while running or managing a worker agent.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Admission was denied by the budget tracker.
    #[error("worker blocked by budget policy: {0}")]
    Blocked(String),

    /// The agent process exceeded its wall-clock timeout and was killed.
    #[error("worker {0} timed out")]
    Timeout(String),

    /// The agent process exited with a non-zero status.
    #[error("worker {worker_id} exited with code {exit_code}")]
    NonZeroExit {
        /// The worker id.
        worker_id: String,
        /// The process exit code.
        exit_code: i32,
    },

    /// The worktree could not be created or removed.
    #[error("worktree operation failed for {worker_id}: {source}")]
    Worktree {
        /// The worker id.
        worker_id: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
}

impl WorkerError {
    /// Whether retrying the same task is plausible without operator intervention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the failure requires operator intervention (budget, scope, worktree state).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::Worktree { .. })
    }
}

/// Errors raised while merging a worker branch into the main working copy.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The VCS reported a non-zero exit from the merge attempt; the coordinator
    /// already ran `merge --abort` before surfacing this.
    #[error("merge conflict merging {worker_id} ({branch}): {message}")]
    Conflict {
        /// The worker id that owned the branch.
        worker_id: String,
        /// The branch name.
        branch: String,
        /// Captured stderr/stdout from the failed merge.
        message: String,
    },

    /// The underlying VCS command could not be invoked at all (binary missing,
    /// permission denied, etc.) — distinct from a merge conflict.
    #[error("vcs command failed: {0}")]
    VcsUnavailable(#[source] anyhow::Error),
}

impl MergeError {
    /// Conflicts are expected operational outcomes, not transient failures to retry blindly.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        false
    }

    /// Whether the merge mutex and working copy are known to be in a clean state
    /// (true for `Conflict`, since `merge --abort` already ran).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::VcsUnavailable(_))
    }
}

/// Errors raised by the IPC server while decoding a client frame.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The frame did not parse as JSON, or parsed but was missing required fields.
    #[error("malformed IPC frame: {0}")]
    Malformed(String),

    /// The message `type` is not one of the supported request types.
    #[error("unsupported IPC message type: {0}")]
    UnsupportedType(String),

    /// Writing a response to the client failed (connection dropped, etc.).
    #[error("failed to write IPC response: {0}")]
    WriteFailed(#[source] std::io::Error),
}

/// Errors raised while loading and validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `swarm.max_workers` must be at least 1.
    #[error("swarm.max_workers must be >= 1, got {0}")]
    InvalidMaxWorkers(usize),

    /// `swarm.approval_mode` must be non-empty.
    #[error("swarm.approval_mode must not be empty")]
    EmptyApprovalMode,

    /// `swarm.codex_binary` must be non-empty.
    #[error("swarm.codex_binary must not be empty")]
    EmptyCodexBinary,

    /// `budget.warn_at_percent` must be in [0, 100].
    #[error("budget.warn_at_percent must be between 0 and 100, got {0}")]
    InvalidWarnPercent(u32),

    /// `worktree.base_dir` must be non-empty.
    #[error("worktree.base_dir must not be empty")]
    EmptyBaseDir,

    /// `worktree.merge_strategy` must be one of abort/ours/theirs.
    #[error("worktree.merge_strategy must be one of abort, ours, theirs, got {0}")]
    InvalidMergeStrategy(String),

    /// `results.response_file` must be non-empty.
    #[error("results.response_file must not be empty")]
    EmptyResponseFile,

    /// `ipc.method` must be unix_socket or file_watch.
    #[error("ipc.method must be unix_socket or file_watch, got {0}")]
    InvalidIpcMethod(String),

    /// `ipc.message_terminator` must be non-empty.
    #[error("ipc.message_terminator must not be empty")]
    EmptyTerminator,

    /// `logging.level` is not a recognized tracing level.
    #[error("logging.level must be one of trace, debug, info, warn, error, got {0}")]
    InvalidLogLevel(String),

    /// `logging.format` is not json or pretty.
    #[error("logging.format must be json or pretty, got {0}")]
    InvalidLogFormat(String),

    /// Figment failed to merge or deserialize the layered configuration.
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Top-level orchestrator error for conditions that stop the process entirely.
///
/// Everything else surfaces as a typed outcome on the event bus; only the
/// `Fatal` taxonomy entry from the spec's error design reaches this type.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The orchestrator could not bind the IPC Unix socket.
    #[error("failed to bind IPC socket at {path}: {source}")]
    IpcBindFailed {
        /// The socket path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The orchestrator could not create the worktree base directory.
    #[error("failed to create worktree base directory {path}: {source}")]
    WorktreeBaseDirFailed {
        /// The base directory path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_timeout_is_transient_not_permanent() {
        let err = WorkerError::Timeout("w1".to_string());
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn worker_blocked_is_permanent_not_transient() {
        let err = WorkerError::Blocked("max_total_cost exceeded".to_string());
        assert!(!err.is_transient());
        assert!(err.is_permanent());
    }

    #[test]
    fn merge_conflict_is_not_transient() {
        let err = MergeError::Conflict {
            worker_id: "w1".to_string(),
            branch: "codex-swarm/worker-w1".to_string(),
            message: "CONFLICT".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn config_error_display_includes_field_context() {
        let err = ConfigError::InvalidMaxWorkers(0);
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError::UnknownTool("spawn_nonsense".to_string());
        assert_eq!(
            err.to_string(),
            "unknown dispatch tool tag: spawn_nonsense"
        );
    }
}
