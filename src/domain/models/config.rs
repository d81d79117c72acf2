//! Layered application configuration.
//!
//! Every struct here follows the same shape: each field carries
//! `#[serde(default = "fn")]` backed by a free function, and the type also
//! implements `Default` explicitly so a config built purely in Rust (tests,
//! `codex-swarm init`) agrees with one round-tripped through YAML with every
//! key omitted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration, assembled by `infrastructure::config::ConfigLoader`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    /// Swarm scheduling and child-process configuration.
    #[serde(default)]
    pub swarm: SwarmConfig,

    /// Token/cost admission control.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Worktree allocation and merge policy.
    #[serde(default)]
    pub worktree: WorktreeConfig,

    /// Response-file composition limits.
    #[serde(default)]
    pub results: ResultsConfig,

    /// IPC transport configuration.
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Structured logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            swarm: SwarmConfig::default(),
            budget: BudgetConfig::default(),
            worktree: WorktreeConfig::default(),
            results: ResultsConfig::default(),
            ipc: IpcConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Swarm scheduling and child-process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SwarmConfig {
    /// Maximum concurrent worker agents.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Model slug passed to the supervisor invocation's `-m` flag.
    #[serde(default)]
    pub supervisor_model: Option<String>,

    /// Model slug passed to each worker invocation's `-m` flag.
    #[serde(default)]
    pub worker_model: Option<String>,

    /// Per-worker wall-clock timeout in seconds.
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: u64,

    /// Supervisor wall-clock timeout in seconds.
    #[serde(default = "default_supervisor_timeout")]
    pub supervisor_timeout: u64,

    /// Value passed to the agent binary's `-a` flag.
    #[serde(default = "default_approval_mode")]
    pub approval_mode: String,

    /// Name or path of the agent CLI binary.
    #[serde(default = "default_codex_binary")]
    pub codex_binary: String,

    /// Whether a pipeline strategy continues past a failed/timed-out step.
    #[serde(default)]
    pub pipeline_continue_on_error: bool,
}

const fn default_max_workers() -> usize {
    4
}

const fn default_worker_timeout() -> u64 {
    300
}

const fn default_supervisor_timeout() -> u64 {
    600
}

fn default_approval_mode() -> String {
    "on-request".to_string()
}

fn default_codex_binary() -> String {
    "codex".to_string()
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            supervisor_model: None,
            worker_model: None,
            worker_timeout: default_worker_timeout(),
            supervisor_timeout: default_supervisor_timeout(),
            approval_mode: default_approval_mode(),
            codex_binary: default_codex_binary(),
            pipeline_continue_on_error: false,
        }
    }
}

/// Token/cost admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Hard cap on cumulative cost in dollars. Zero or negative disables the check.
    #[serde(default = "default_max_total_cost")]
    pub max_total_cost: f64,

    /// Advisory per-worker cost cap in dollars.
    #[serde(default = "default_max_worker_cost")]
    pub max_worker_cost: f64,

    /// Hard cap on cumulative tokens. Zero or negative disables the check.
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: u64,

    /// Percentage of `max_total_cost` at which the sticky warn flag is set.
    #[serde(default = "default_warn_at_percent")]
    pub warn_at_percent: u32,

    /// Price per 1K tokens `(input, output)` keyed by model slug. Unlisted
    /// slugs fall back to `(0.004, 0.012)`. Exposed as data per the design
    /// note that pricing should not be hard-coded in source.
    #[serde(default)]
    pub model_pricing: HashMap<String, (f64, f64)>,
}

const fn default_max_total_cost() -> f64 {
    5.0
}

const fn default_max_worker_cost() -> f64 {
    1.5
}

const fn default_max_total_tokens() -> u64 {
    200_000
}

const fn default_warn_at_percent() -> u32 {
    80
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_cost: default_max_total_cost(),
            max_worker_cost: default_max_worker_cost(),
            max_total_tokens: default_max_total_tokens(),
            warn_at_percent: default_warn_at_percent(),
            model_pricing: HashMap::new(),
        }
    }
}

/// Worktree allocation and merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorktreeConfig {
    /// Base directory under which per-worker worktrees are created.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Remove the worktree working directory after a worker's branch is released.
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// Automatically merge a worker's branch once it completes in-scope.
    #[serde(default = "default_true")]
    pub auto_merge: bool,

    /// Default conflict-resolution strategy passed to `mergeBranch`.
    #[serde(default = "default_merge_strategy")]
    pub merge_strategy: String,
}

fn default_base_dir() -> String {
    "/tmp/codex-swarm".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_merge_strategy() -> String {
    "no-ff".to_string()
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            cleanup: default_true(),
            auto_merge: default_true(),
            merge_strategy: default_merge_strategy(),
        }
    }
}

/// Response-file composition limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResultsConfig {
    /// Approximate token budget (chars / 4) for a compressed summary block.
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: u32,

    /// Whether `diff`/`full` return formats include the unified diff.
    #[serde(default)]
    pub include_diff: bool,

    /// Maximum number of diff lines before truncation.
    #[serde(default = "default_max_diff_lines")]
    pub max_diff_lines: usize,

    /// Path (relative to the repository root) of the append-only response file.
    #[serde(default = "default_response_file")]
    pub response_file: String,
}

const fn default_max_summary_tokens() -> u32 {
    500
}

const fn default_max_diff_lines() -> usize {
    200
}

fn default_response_file() -> String {
    ".codex-swarm-response.md".to_string()
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            max_summary_tokens: default_max_summary_tokens(),
            include_diff: false,
            max_diff_lines: default_max_diff_lines(),
            response_file: default_response_file(),
        }
    }
}

/// IPC transport method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcMethod {
    /// Unix domain socket server (implemented).
    UnixSocket,
    /// File-watch based transport (recognized by config, not implemented by
    /// this orchestrator core — an external collaborator concern).
    FileWatch,
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IpcConfig {
    /// Which transport to start.
    #[serde(default)]
    pub method: IpcMethod,

    /// Unix domain socket path (when `method == unix_socket`).
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Multi-byte sentinel terminating each frame.
    #[serde(default = "default_message_terminator")]
    pub message_terminator: String,
}

fn default_socket_path() -> String {
    "/tmp/codex-swarm.sock".to_string()
}

fn default_message_terminator() -> String {
    "\n---MSG_END---\n".to_string()
}

impl Default for IpcMethod {
    fn default() -> Self {
        Self::UnixSocket
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            method: IpcMethod::default(),
            socket_path: default_socket_path(),
            message_terminator: default_message_terminator(),
        }
    }
}

/// Structured logging configuration (ambient, not part of the core spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Minimum emitted level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.swarm.max_workers, 4);
        assert_eq!(cfg.swarm.worker_timeout, 300);
        assert_eq!(cfg.swarm.supervisor_timeout, 600);
        assert_eq!(cfg.swarm.approval_mode, "on-request");
        assert_eq!(cfg.swarm.codex_binary, "codex");
        assert!((cfg.budget.max_total_cost - 5.0).abs() < f64::EPSILON);
        assert!((cfg.budget.max_worker_cost - 1.5).abs() < f64::EPSILON);
        assert_eq!(cfg.budget.max_total_tokens, 200_000);
        assert_eq!(cfg.budget.warn_at_percent, 80);
        assert_eq!(cfg.worktree.base_dir, "/tmp/codex-swarm");
        assert!(cfg.worktree.auto_merge);
        assert_eq!(cfg.results.response_file, ".codex-swarm-response.md");
        assert_eq!(cfg.ipc.socket_path, "/tmp/codex-swarm.sock");
        assert_eq!(cfg.ipc.message_terminator, "\n---MSG_END---\n");
    }

    #[test]
    fn deserializes_from_empty_yaml_mapping() {
        let cfg: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.swarm.max_workers, AppConfig::default().swarm.max_workers);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "swarm:\n  max_workers: 8\n";
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.swarm.max_workers, 8);
        assert_eq!(cfg.swarm.worker_timeout, 300);
    }
}
