//! Token/cost accounting and admission control (spec §4.6).

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::domain::models::{BudgetSnapshot, TokenUsage};

/// Fallback `(input, output)` price per 1K tokens for a model slug with no
/// entry in `model_pricing` (spec §9: pricing is data, not code).
const DEFAULT_PRICING: (f64, f64) = (0.004, 0.012);

struct State {
    total_input_tokens: u64,
    total_output_tokens: u64,
    total_cost: f64,
    warned: bool,
    worker_costs: HashMap<String, f64>,
}

/// Tracks cumulative and per-worker token/cost usage and gates new spawns.
pub struct BudgetTracker {
    max_total_cost: f64,
    max_worker_cost: f64,
    max_total_tokens: u64,
    warn_at_percent: u32,
    model_pricing: HashMap<String, (f64, f64)>,
    state: RwLock<State>,
}

impl BudgetTracker {
    /// Build a tracker from the `budget.*` configuration surface.
    #[must_use]
    pub fn new(
        max_total_cost: f64,
        max_worker_cost: f64,
        max_total_tokens: u64,
        warn_at_percent: u32,
        model_pricing: HashMap<String, (f64, f64)>,
    ) -> Self {
        Self {
            max_total_cost,
            max_worker_cost,
            max_total_tokens,
            warn_at_percent,
            model_pricing,
            state: RwLock::new(State {
                total_input_tokens: 0,
                total_output_tokens: 0,
                total_cost: 0.0,
                warned: false,
                worker_costs: HashMap::new(),
            }),
        }
    }

    fn price_for(&self, model: Option<&str>) -> (f64, f64) {
        model
            .and_then(|m| self.model_pricing.get(m))
            .copied()
            .unwrap_or(DEFAULT_PRICING)
    }

    fn estimated_cost(&self, model: Option<&str>, usage: &TokenUsage) -> f64 {
        let (input_price, output_price) = self.price_for(model);
        let billable_input = usage.billable_input_tokens();
        let cost = (billable_input as f64 / 1000.0) * input_price
            + (usage.output_tokens as f64 / 1000.0) * output_price;
        (cost * 1_000_000.0).round() / 1_000_000.0
    }

    /// Whether admitting a new worker is currently permitted. Zero or
    /// negative caps disable the corresponding check.
    pub async fn can_spawn(&self) -> bool {
        let state = self.state.read().await;
        let total_tokens = state.total_input_tokens + state.total_output_tokens;
        if self.max_total_tokens > 0 && total_tokens >= self.max_total_tokens {
            return false;
        }
        if self.max_total_cost > 0.0 && state.total_cost >= self.max_total_cost {
            return false;
        }
        true
    }

    /// Advisory: whether `worker_id`'s attributed cost is still under
    /// `max_worker_cost`. Never blocks admission on its own.
    pub async fn worker_within_budget(&self, worker_id: &str) -> bool {
        if self.max_worker_cost <= 0.0 {
            return true;
        }
        let state = self.state.read().await;
        state
            .worker_costs
            .get(worker_id)
            .is_none_or(|cost| *cost < self.max_worker_cost)
    }

    /// Apply a usage delta attributed to `worker_id` (or `"supervisor"`),
    /// returning the estimated cost of this delta and the latest snapshot.
    #[instrument(skip(self, usage), fields(worker_id, input = usage.input_tokens, output = usage.output_tokens))]
    pub async fn add_usage(
        &self,
        worker_id: &str,
        model: Option<&str>,
        usage: &TokenUsage,
    ) -> (f64, BudgetSnapshot) {
        let cost = self.estimated_cost(model, usage);
        let mut state = self.state.write().await;
        state.total_input_tokens = state.total_input_tokens.saturating_add(usage.input_tokens);
        state.total_output_tokens = state.total_output_tokens.saturating_add(usage.output_tokens);
        state.total_cost += cost;
        *state.worker_costs.entry(worker_id.to_string()).or_insert(0.0) += cost;

        if !state.warned && self.max_total_cost > 0.0 {
            let percent = (state.total_cost / self.max_total_cost) * 100.0;
            if percent >= f64::from(self.warn_at_percent) {
                state.warned = true;
            }
        }

        let snapshot = BudgetSnapshot {
            total_input_tokens: state.total_input_tokens,
            total_output_tokens: state.total_output_tokens,
            total_cost: (state.total_cost * 1_000_000.0).round() / 1_000_000.0,
            warned: state.warned,
            worker_costs: state.worker_costs.clone(),
        };
        (cost, snapshot)
    }

    /// A point-in-time snapshot without mutating state.
    pub async fn snapshot(&self) -> BudgetSnapshot {
        let state = self.state.read().await;
        BudgetSnapshot {
            total_input_tokens: state.total_input_tokens,
            total_output_tokens: state.total_output_tokens,
            total_cost: state.total_cost,
            warned: state.warned,
            worker_costs: state.worker_costs.clone(),
        }
    }

    /// Fallback output-token estimate for a worker whose stdout produced no
    /// `turn.completed` usage events (spec §4.3 step 6).
    #[must_use]
    pub fn estimate_usage_from_text(raw_stdout: &str) -> TokenUsage {
        TokenUsage {
            input_tokens: 0,
            cached_input_tokens: 0,
            output_tokens: std::cmp::max(1, raw_stdout.len() as u64 / 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_cost: f64, max_tokens: u64) -> BudgetTracker {
        BudgetTracker::new(max_cost, 1.5, max_tokens, 80, HashMap::new())
    }

    #[tokio::test]
    async fn can_spawn_true_until_token_cap_reached() {
        let tracker = tracker(0.0, 100);
        assert!(tracker.can_spawn().await);
        tracker
            .add_usage(
                "w1",
                None,
                &TokenUsage { input_tokens: 60, cached_input_tokens: 0, output_tokens: 50 },
            )
            .await;
        assert!(!tracker.can_spawn().await);
    }

    #[tokio::test]
    async fn zero_or_negative_caps_disable_the_check() {
        let tracker = tracker(0.0, 0);
        tracker
            .add_usage(
                "w1",
                None,
                &TokenUsage { input_tokens: 1_000_000, cached_input_tokens: 0, output_tokens: 1_000_000 },
            )
            .await;
        assert!(tracker.can_spawn().await);
    }

    #[tokio::test]
    async fn total_cost_is_monotonically_non_decreasing_and_warned_is_sticky() {
        let tracker = tracker(1.0, 0);
        let mut prev = 0.0;
        for _ in 0..5 {
            let (_, snapshot) = tracker
                .add_usage(
                    "w1",
                    None,
                    &TokenUsage { input_tokens: 50_000, cached_input_tokens: 0, output_tokens: 10_000 },
                )
                .await;
            assert!(snapshot.total_cost >= prev);
            prev = snapshot.total_cost;
        }
        let snapshot = tracker.snapshot().await;
        assert!(snapshot.warned);
    }

    #[tokio::test]
    async fn unknown_model_falls_back_to_default_pricing() {
        let tracker = tracker(0.0, 0);
        let (cost, _) = tracker
            .add_usage(
                "w1",
                Some("unknown-model"),
                &TokenUsage { input_tokens: 1000, cached_input_tokens: 0, output_tokens: 1000 },
            )
            .await;
        assert!((cost - 0.016).abs() < 1e-9);
    }

    #[tokio::test]
    async fn worker_within_budget_is_advisory_only() {
        let tracker = tracker(0.0, 0);
        tracker
            .add_usage(
                "w1",
                None,
                &TokenUsage { input_tokens: 1_000_000, cached_input_tokens: 0, output_tokens: 1_000_000 },
            )
            .await;
        assert!(!tracker.worker_within_budget("w1").await);
        assert!(tracker.can_spawn().await);
    }
}
