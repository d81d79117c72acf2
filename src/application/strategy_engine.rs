//! Composes worker tasks into fan-out / pipeline / map-reduce / debate
//! schedules over a shared worker pool (spec §4.4).

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;

use crate::domain::models::{SpawnAgentPayload, Strategy, WorkerExecutionResult, WorkerStatus};

use super::worker_manager::WorkerManager;

/// The fixed reducer task text for the map-reduce strategy (spec §4.4).
const REDUCER_TASK: &str =
    "Produce a consolidated summary of all map results and list final recommendations.";

/// Owns the binary queue gate and dispatches tasks through a `WorkerManager`
/// under one of the four scheduling strategies.
pub struct StrategyEngine {
    worker_manager: Arc<WorkerManager>,
    gate_tx: watch::Sender<bool>,
    pipeline_continue_on_error: bool,
}

impl StrategyEngine {
    /// Build an engine with the gate initially open (running).
    #[must_use]
    pub fn new(worker_manager: Arc<WorkerManager>, pipeline_continue_on_error: bool) -> Self {
        let (gate_tx, _) = watch::channel(true);
        Self {
            worker_manager,
            gate_tx,
            pipeline_continue_on_error,
        }
    }

    /// Clear the gate; new dispatches block until `resume_queue`. Workers
    /// already running are not interrupted.
    pub fn pause_queue(&self) {
        let _ = self.gate_tx.send(false);
    }

    /// Set the gate, unblocking any dispatch waiting on it.
    pub fn resume_queue(&self) {
        let _ = self.gate_tx.send(true);
    }

    async fn await_gate(&self) {
        let mut rx = self.gate_tx.subscribe();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Dispatch `tasks` under `strategy`, returning every worker's result.
    pub async fn dispatch(
        &self,
        tasks: Vec<SpawnAgentPayload>,
        strategy: Strategy,
    ) -> Vec<WorkerExecutionResult> {
        match strategy {
            Strategy::FanOut => self.fan_out(tasks).await,
            Strategy::Pipeline => self.pipeline(tasks).await,
            Strategy::MapReduce => self.map_reduce(tasks).await,
            Strategy::Debate => self.debate(tasks).await,
        }
    }

    fn sorted_by_priority(mut tasks: Vec<SpawnAgentPayload>) -> Vec<SpawnAgentPayload> {
        tasks.sort_by_key(|t| t.priority);
        tasks
    }

    /// Dispatch every task concurrently; results are returned in completion
    /// order, not input order (spec scenario A).
    async fn fan_out(&self, tasks: Vec<SpawnAgentPayload>) -> Vec<WorkerExecutionResult> {
        let tasks = Self::sorted_by_priority(tasks);
        let mut in_flight = FuturesUnordered::new();
        for task in tasks {
            self.await_gate().await;
            let worker_manager = self.worker_manager.clone();
            in_flight.push(async move { worker_manager.run_task(task, None, None).await });
        }
        let mut results = Vec::new();
        while let Some(result) = in_flight.next().await {
            results.push(result);
        }
        results
    }

    /// Dispatch sequentially, threading a rolling context forward and
    /// optionally stopping after the first failed/timed-out step.
    async fn pipeline(&self, tasks: Vec<SpawnAgentPayload>) -> Vec<WorkerExecutionResult> {
        let mut results = Vec::new();
        let mut rolling_context = String::new();
        for task in tasks {
            self.await_gate().await;
            let context = if rolling_context.is_empty() {
                None
            } else {
                Some(rolling_context.clone())
            };
            let result = self.worker_manager.run_task(task, context, None).await;
            rolling_context = format!(
                "{rolling_context}\n\nPrevious step {} summary:\n{}",
                result.worker_id, result.result.summary
            );
            let stop = matches!(result.status, WorkerStatus::Failed | WorkerStatus::TimedOut)
                && !self.pipeline_continue_on_error;
            results.push(result);
            if stop {
                break;
            }
        }
        results
    }

    /// Fan-out followed by one reducer worker summarizing all map results.
    async fn map_reduce(&self, tasks: Vec<SpawnAgentPayload>) -> Vec<WorkerExecutionResult> {
        let mut results = self.fan_out(tasks).await;
        let bullets: String = results
            .iter()
            .map(|r| format!("- {}: {}", r.worker_id, r.result.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let reducer_context = format!("Map worker results:\n{bullets}");
        let reducer_task = SpawnAgentPayload {
            task: REDUCER_TASK.to_string(),
            scope: Vec::new(),
            context: String::new(),
            priority: crate::domain::models::Priority::Normal,
            return_format: crate::domain::models::ReturnFormat::Summary,
        };
        self.await_gate().await;
        let reducer_result = self
            .worker_manager
            .run_task(reducer_task, Some(reducer_context), None)
            .await;
        results.push(reducer_result);
        results
    }

    /// Fan-out, then mark the highest-confidence successful worker as the
    /// debate winner (ties broken by first-seen order).
    async fn debate(&self, tasks: Vec<SpawnAgentPayload>) -> Vec<WorkerExecutionResult> {
        let mut results = self.fan_out(tasks).await;
        let mut winner_index: Option<usize> = None;
        let mut winner_confidence = f64::MIN;
        for (idx, result) in results.iter().enumerate() {
            if !matches!(result.status, WorkerStatus::Completed | WorkerStatus::PendingApproval) {
                continue;
            }
            if result.result.confidence > winner_confidence {
                winner_confidence = result.result.confidence;
                winner_index = Some(idx);
            }
        }
        if let Some(idx) = winner_index {
            results[idx].result.key_decisions.push("debate_winner".to_string());
        }
        results
    }
}
