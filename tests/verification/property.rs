//! Property-based tests for the state merge and its helpers.
//!
//! These tests use proptest to check that the merge rules hold under random inputs,
//! working on [`SessionStateStore`] directly and on a full client where timing matters.
//!
//! # Properties Tested
//!
//! ## State store
//! - Authoritative scores and health are last-writer-wins per key
//! - Health never leaves `0..=max_health`, whatever the server or the heuristic says
//! - Applying the same snapshot twice equals applying it once
//! - Participants are never removed, and the invariant checker always passes
//!
//! ## Helpers
//! - Cooldown remaining time never grows as time passes
//! - Free text always yields a submission unless blank

use coop_sync::__internal::{AuthoritativeUpdate, HealthMap, ScoreMap};
use coop_sync::sessions::submission::parse_free_text;
use coop_sync::telemetry::InvariantChecker;
use coop_sync::{
    ActionKind, ActionRecord, CooldownMap, CooldownTracker, FeedConfig, HealthConfig,
    ParticipantId, SessionStateStore,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Strategy for participant ids drawn from a small pool, so keys collide often
fn id_strategy() -> impl Strategy<Value = ParticipantId> {
    prop_oneof![Just("u1"), Just("u2"), Just("u3"), Just("bot-1")].prop_map(ParticipantId::new)
}

/// Strategy for one partial authoritative map
fn partial_map_strategy(values: std::ops::Range<i64>) -> impl Strategy<Value = BTreeMap<ParticipantId, i64>> {
    prop::collection::btree_map(id_strategy(), values, 0..4)
}

/// Strategy for a resolved action by a pooled participant
fn record_strategy() -> impl Strategy<Value = ActionRecord> {
    (id_strategy(), any::<bool>(), -50i64..50, 0u32..1000).prop_map(
        |(actor, is_correct, score, stamp)| ActionRecord {
            payload: format!("probe|{}||T{}", actor, stamp),
            actor_id: Some(actor),
            is_correct,
            score: Some(score),
            timestamp: Some(format!("T{}", stamp)),
            ..ActionRecord::default()
        },
    )
}

fn store() -> SessionStateStore {
    SessionStateStore::new("P", HealthConfig::default(), FeedConfig::default())
}

// ============================================================================
// State Store Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_scores_are_last_writer_wins(maps in prop::collection::vec(partial_map_strategy(-100..100), 1..10)) {
        let mut store = store();
        let mut expected = BTreeMap::new();
        for map in &maps {
            store.merge_scores(map);
            for (id, score) in map {
                expected.insert(id.clone(), *score);
            }
        }
        for (id, score) in &expected {
            prop_assert_eq!(store.score(id), *score);
        }
        prop_assert_eq!(store.recorded_scores(), &expected);
    }

    #[test]
    fn prop_health_is_clamped_last_writer_wins(maps in prop::collection::vec(partial_map_strategy(-200..300), 1..10)) {
        let mut store = store();
        let mut expected = BTreeMap::new();
        for map in &maps {
            store.merge_health(map);
            for (id, health) in map {
                expected.insert(id.clone(), (*health).clamp(0, 100));
            }
        }
        prop_assert_eq!(store.recorded_health(), &expected);
    }

    #[test]
    fn prop_health_stays_in_range_under_heuristic(records in prop::collection::vec(record_strategy(), 1..40)) {
        let mut store = store();
        for record in &records {
            let _ = store.record_action(record, AuthoritativeUpdate::default());
            for participant in store.participants() {
                let health = store.health(&participant.id);
                prop_assert!((0..=100).contains(&health), "health {} out of range", health);
            }
        }
    }

    #[test]
    fn prop_snapshot_is_idempotent(
        scores in partial_map_strategy(-100..100),
        health in partial_map_strategy(0..100),
    ) {
        let update = AuthoritativeUpdate {
            scores: Some(&scores),
            health: Some(&health),
            ..AuthoritativeUpdate::default()
        };
        let mut once = store();
        once.merge_authoritative(update);
        let mut twice = store();
        twice.merge_authoritative(update);
        twice.merge_authoritative(update);

        prop_assert_eq!(once.ranking(), twice.ranking());
        prop_assert_eq!(once.recorded_health(), twice.recorded_health());
    }

    #[test]
    fn prop_records_are_applied_once(records in prop::collection::vec(record_strategy(), 1..20)) {
        let mut once = store();
        let mut twice = store();
        for record in &records {
            let _ = once.record_action(record, AuthoritativeUpdate::default());
            let _ = twice.record_action(record, AuthoritativeUpdate::default());
            let repeated = twice.record_action(record, AuthoritativeUpdate::default());
            prop_assert!(repeated.is_none());
        }
        prop_assert_eq!(once.ranking(), twice.ranking());
        prop_assert_eq!(once.feed().len(), twice.feed().len());
    }

    #[test]
    fn prop_participants_only_grow_and_invariants_hold(
        records in prop::collection::vec(record_strategy(), 0..20),
        scores in partial_map_strategy(-10..10),
        health in partial_map_strategy(-10..150),
    ) {
        let mut store = store();
        let mut seen = 0;
        for record in &records {
            let _ = store.record_action(record, AuthoritativeUpdate {
                scores: Some(&scores),
                health: Some(&health),
                ..AuthoritativeUpdate::default()
            });
            prop_assert!(store.participant_count() >= seen);
            seen = store.participant_count();
            prop_assert!(store.check_invariants().is_ok());
        }
        let merged_scores: ScoreMap = scores.clone();
        let merged_health: HealthMap = health.clone();
        store.merge_scores(&merged_scores);
        store.merge_health(&merged_health);
        prop_assert!(store.check_invariants().is_ok());
    }
}

// ============================================================================
// Helper Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_cooldown_remaining_never_grows(expiry in 0.0f64..1000.0, start in 0.0f64..1000.0, step in 0.0f64..50.0) {
        let mut map = CooldownMap::new();
        map.insert("probe".to_owned(), expiry);
        let tracker = CooldownTracker::new(&map);
        let actor = ParticipantId::new("u1");
        let earlier = tracker.remaining_for(ActionKind::Probe, &actor, start);
        let later = tracker.remaining_for(ActionKind::Probe, &actor, start + step);
        prop_assert!(later <= earlier);
        prop_assert_eq!(tracker.is_ready("probe", start), earlier == 0);
    }

    #[test]
    fn prop_free_text_yields_submission_unless_blank(text in ".{0,40}") {
        match parse_free_text(&text) {
            None => prop_assert!(text.trim().is_empty()),
            Some((kind, body)) => {
                prop_assert!(!text.trim().is_empty());
                if kind == ActionKind::Exploit {
                    prop_assert!(text.contains(body.as_str()));
                } else {
                    prop_assert!(text.to_ascii_lowercase().contains(kind.as_str()));
                }
            }
        }
    }
}
