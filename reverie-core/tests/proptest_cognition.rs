//! Property-based tests for the cognitive core.
//!
//! Uses `proptest` to verify structural invariants under random inputs:
//! clamping, capacity bounds, retrieval ordering, and plan-completion
//! monotonicity.

use proptest::prelude::*;

use reverie_core::config::{MemoryConfig, RetrievalConfig};
use reverie_core::memory::{MemoryKind, MemoryRecord, MemoryStream};
use reverie_core::planning::hierarchy::{
    ActionKind, ActionPlan, DailyPlan, HourlyPlan, PlanPriority, PlanStatus,
};
use reverie_core::retrieval::RetrievalEngine;
use reverie_core::types::SimTimestamp;

fn ts(tick: u64) -> SimTimestamp {
    SimTimestamp::now(tick)
}

// ---------------------------------------------------------------------------
// Property: importance is always clamped to [1, 10]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn importance_always_clamped(importance in 0u8..=255) {
        let record = MemoryRecord::new(
            MemoryKind::Observation,
            "test event",
            importance,
            vec![],
            None,
            ts(0),
        );
        prop_assert!(record.importance >= 1);
        prop_assert!(record.importance <= 10);
    }
}

// ---------------------------------------------------------------------------
// Property: the stream never exceeds capacity for any insert sequence
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn capacity_never_exceeded(
        capacity in 1usize..20,
        importances in prop::collection::vec(0u8..=255, 0..60),
    ) {
        let mut stream = MemoryStream::new(MemoryConfig {
            capacity,
            ..MemoryConfig::default()
        });
        for (i, importance) in importances.iter().enumerate() {
            stream.add_observation(
                format!("event {i}"),
                *importance,
                vec![],
                None,
                ts(i as u64 * 30),
            );
            prop_assert!(stream.all().len() <= capacity);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: an overflow pass always keeps a maximum-importance record
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn eviction_keeps_a_top_importance_record(
        importances in prop::collection::vec(1u8..=10, 6..30),
    ) {
        // Same creation tick for everyone: retention reduces to the
        // importance term, so a max-importance record must survive.
        let capacity = 5;
        let mut stream = MemoryStream::new(MemoryConfig {
            capacity,
            ..MemoryConfig::default()
        });
        for (i, importance) in importances.iter().enumerate() {
            stream.add_observation(format!("event {i}"), *importance, vec![], None, ts(0));
        }
        let max_in = importances.iter().copied().max().unwrap_or(1);
        let max_kept = stream.all().iter().map(|r| r.importance).max().unwrap_or(0);
        prop_assert_eq!(max_kept, max_in);
    }
}

// ---------------------------------------------------------------------------
// Property: retrieve returns ≤ k results in non-increasing score order
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn retrieval_bounded_and_sorted(
        k in 0usize..20,
        importances in prop::collection::vec(1u8..=10, 0..30),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let mut stream = MemoryStream::with_capacity(100);
        for (i, importance) in importances.iter().enumerate() {
            stream.add_observation(format!("event {i}"), *importance, vec![], None, ts(i as u64));
        }
        let engine = RetrievalEngine::new(RetrievalConfig::default(), None);
        let results = runtime.block_on(engine.retrieve(&mut stream, "event", k, 1.0, ts(1000)));
        prop_assert!(results.len() <= k);
        prop_assert!(results.len() <= importances.len());
        for pair in results.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: completing every action completes the whole hierarchy
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn plan_completion_is_monotonic(
        hour_count in 1usize..4,
        actions_per_hour in 1usize..6,
    ) {
        let mut daily = DailyPlan::new("goal", "reasoning", PlanPriority::Medium, ts(0));
        for h in 0..hour_count {
            let mut hour = HourlyPlan::new(daily.id, ts(h as u64 * 3600), format!("hour {h}"));
            for a in 0..actions_per_hour {
                hour.actions.push(ActionPlan::new(
                    hour.id,
                    ts((h * 3600 + a * 300) as u64),
                    5,
                    ActionKind::Explore,
                    format!("action {a}"),
                ));
            }
            daily.hours.push(hour);
        }

        let ids: Vec<_> = daily
            .hours
            .iter()
            .flat_map(|h| h.actions.iter().map(|a| a.id))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            daily.complete_action(*id, ts(10_000 + i as u64));
            // Status only ever moves forward.
            let done_hours = daily
                .hours
                .iter()
                .filter(|h| h.status == PlanStatus::Completed)
                .count();
            prop_assert!(done_hours <= i / actions_per_hour + 1);
        }
        prop_assert_eq!(daily.status, PlanStatus::Completed);
        prop_assert!(daily
            .hours
            .iter()
            .all(|h| h.status == PlanStatus::Completed));
    }
}
