//! Domain models
//!
//! Pure domain entities: configuration, dispatch payloads, worker/merge
//! results, worktree state, and the runtime event envelope. Framework-agnostic
//! and free of infrastructure concerns.

pub mod config;
pub mod dispatch;
pub mod event;
pub mod ipc;
pub mod worker;
pub mod worktree;

pub use config::{
    AppConfig, BudgetConfig, IpcConfig, IpcMethod, LoggingConfig, ResultsConfig, SwarmConfig,
    WorktreeConfig,
};
pub use dispatch::{
    CheckWorkersPayload, DispatchRequest, MergeResultsPayload, Priority, ResolveConflicts,
    ReturnFormat, SpawnAgentPayload, SpawnSwarmPayload, Strategy,
};
pub use event::{EventPayload, RuntimeEvent};
pub use ipc::IpcMessage;
pub use worker::{
    BudgetSnapshot, MergeOutcome, TestsStatus, TokenUsage, WorkerExecutionResult, WorkerResult,
    WorkerResultStatus, WorkerStatus,
};
pub use worktree::{WorktreeInfo, WorktreeStatus};
