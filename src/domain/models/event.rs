//! Runtime event envelope broadcast on the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::worker::{BudgetSnapshot, MergeOutcome, WorkerStatus};

/// A single bus event, carrying a monotonically increasing sequence number
/// (per spec §4.7's ordering diagnostics) and a UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    /// Monotonically increasing per-process sequence number.
    pub sequence: u64,
    /// Wall-clock emission time.
    pub timestamp: DateTime<Utc>,
    /// The tagged payload.
    pub payload: EventPayload,
}

impl RuntimeEvent {
    /// The wire `event_type` string for this event, e.g. `"worker.completed"`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Tagged event payload. Variant names map to the `event_type` strings named
/// in spec §4.7 via `event_type()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    /// `orchestrator.started`
    OrchestratorStarted,
    /// `orchestrator.stopped`
    OrchestratorStopped,
    /// `supervisor.completed`
    SupervisorCompleted {
        /// Supervisor process exit code.
        exit_code: i32,
    },
    /// `supervisor.killed`
    SupervisorKilled,
    /// `dispatch.received`
    DispatchReceived {
        /// The dispatch tool tag.
        tool: String,
        /// The correlation id, if the dispatch carried one.
        request_id: Option<String>,
    },
    /// `worker.status`
    WorkerStatusChanged {
        /// The worker id.
        worker_id: String,
        /// The new status.
        status: WorkerStatus,
        /// The originating task text, when known.
        task: Option<String>,
    },
    /// `worker.completed`
    WorkerCompleted {
        /// The worker id.
        worker_id: String,
        /// Final lifecycle status.
        status: WorkerStatus,
        /// The originating task text.
        task: String,
        /// Whether the result requires supervisor approval before merging.
        requires_approval: bool,
        /// Files touched outside the declared scope.
        out_of_scope_files: Vec<String>,
    },
    /// `worker.merged`
    WorkerMerged {
        /// The worker id.
        worker_id: String,
        /// The merge outcome.
        outcome: MergeOutcome,
    },
    /// `budget.updated`
    BudgetUpdated {
        /// The latest budget snapshot.
        snapshot: BudgetSnapshot,
    },
    /// `log`
    Log {
        /// The channel the line came from, e.g. `supervisor_stdout`.
        channel: String,
        /// The captured line.
        line: String,
    },
    /// `response.written`
    ResponseWritten {
        /// The response file path.
        path: String,
        /// The marker/request id used in the HTML-comment delimiters.
        request_id: String,
    },
}

impl EventPayload {
    /// The wire `event_type` string, matching spec §4.7's enumerated event types.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::OrchestratorStarted => "orchestrator.started",
            Self::OrchestratorStopped => "orchestrator.stopped",
            Self::SupervisorCompleted { .. } => "supervisor.completed",
            Self::SupervisorKilled => "supervisor.killed",
            Self::DispatchReceived { .. } => "dispatch.received",
            Self::WorkerStatusChanged { .. } => "worker.status",
            Self::WorkerCompleted { .. } => "worker.completed",
            Self::WorkerMerged { .. } => "worker.merged",
            Self::BudgetUpdated { .. } => "budget.updated",
            Self::Log { .. } => "log",
            Self::ResponseWritten { .. } => "response.written",
        }
    }

    /// Whether this event type should be broadcast over IPC. All bus events
    /// except `log` are broadcast per spec §4.7.
    #[must_use]
    pub const fn is_ipc_broadcastable(&self) -> bool {
        !matches!(self, Self::Log { .. })
    }
}
