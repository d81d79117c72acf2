//! Property-based tests for `BudgetTracker`'s accounting invariants
//! (spec §8 property 5).
//!
//! Tests the following properties:
//! 1. Monotonicity: `total_cost` never decreases across `add_usage` calls
//! 2. Sticky warning: once `warned` flips true it never flips back
//! 3. Billable input never exceeds reported input tokens

use codex_swarm::application::BudgetTracker;
use codex_swarm::domain::models::TokenUsage;
use proptest::prelude::*;
use std::collections::HashMap;

fn usage_strategy() -> impl Strategy<Value = TokenUsage> {
    (0u64..50_000, 0u64..50_000, 0u64..50_000).prop_map(
        |(input_tokens, cached_input_tokens, output_tokens)| TokenUsage {
            input_tokens,
            cached_input_tokens,
            output_tokens,
        },
    )
}

proptest! {
    /// Property 5: `total_cost` is non-decreasing across any sequence of
    /// `add_usage` calls, and the sticky `warned` flag never clears once set.
    #[test]
    fn prop_total_cost_monotonic_and_warned_sticky(
        deltas in prop::collection::vec(usage_strategy(), 1..20)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let tracker = BudgetTracker::new(1.0, 0.0, 0, 50, HashMap::new());

        rt.block_on(async {
            let mut prev_cost = 0.0;
            let mut warned_once = false;
            for (i, delta) in deltas.iter().enumerate() {
                let (_, snapshot) = tracker.add_usage(&format!("w{i}"), None, delta).await;
                prop_assert!(snapshot.total_cost >= prev_cost);
                prev_cost = snapshot.total_cost;
                if warned_once {
                    prop_assert!(snapshot.warned, "warned flag cleared after being set");
                }
                warned_once = warned_once || snapshot.warned;
            }
            Ok(())
        })?;
    }

    /// Property: billable input tokens never exceed the raw input tokens
    /// reported, regardless of how large `cached_input_tokens` is relative
    /// to `input_tokens` (spec §3: "billable input = max(0, input - cached)").
    #[test]
    fn prop_billable_input_never_exceeds_input(usage in usage_strategy()) {
        prop_assert!(usage.billable_input_tokens() <= usage.input_tokens);
    }

    /// Property: zero or negative caps disable admission gating entirely,
    /// no matter how much usage has already been recorded (spec §4.6).
    #[test]
    fn prop_non_positive_caps_always_admit(deltas in prop::collection::vec(usage_strategy(), 0..10)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let tracker = BudgetTracker::new(0.0, 0.0, 0, 50, HashMap::new());
        rt.block_on(async {
            for (i, delta) in deltas.iter().enumerate() {
                tracker.add_usage(&format!("w{i}"), None, delta).await;
            }
            prop_assert!(tracker.can_spawn().await);
            Ok(())
        })?;
    }
}
