//! The final summary is shown at most once, whatever ends the session.

use crate::common::{action_result, record, TestClient};
use coop_sync::prelude::*;
use coop_sync::RenderCall;
use serde_json::json;

fn finalized_events(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Finalized { .. }))
        .count()
}

#[test]
fn elimination_finalizes_once() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u2": 0}}));
    test.deliver("session_update", json!({"hp_map": {"u2": 0}}));
    test.deliver("session_ended", json!({}));

    assert_eq!(finalized_events(&test.events()), 1);
    assert_eq!(
        test.calls(|c| matches!(c, RenderCall::FinalResults { .. })),
        1
    );
    assert_eq!(test.client.finalize_reason(), Some(FinalizeReason::Elimination));
    assert_eq!(
        test.feed()
            .iter()
            .filter(|line| *line == "Session ended — showing results")
            .count(),
        1
    );
}

#[test]
fn heuristic_damage_can_eliminate() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u2": 8}}));
    test.deliver(
        "action_result",
        action_result(&record("u2", "exploit").failed()),
    );
    assert_eq!(test.health("u2"), 0);
    assert!(test.client.is_finalized());
}

#[test]
fn explicit_end_after_explicit_end_is_ignored() {
    let mut test = TestClient::started();
    test.deliver("session_ended", json!({"results": {"u1": {"score": 3}}}));
    test.deliver("session_ended", json!({"results": {"u1": {"score": 99}}}));

    let events = test.events();
    assert_eq!(finalized_events(&events), 1);
    // state still merges after the summary
    assert_eq!(test.score("u1"), 99);
    assert_eq!(test.client.finalize_reason(), Some(FinalizeReason::Explicit));
}

#[test]
fn ranking_is_sorted_by_score_with_stable_ties() {
    let mut test = TestClient::participant();
    test.start(&[("u1", "Alice"), ("u2", "Bob"), ("u3", "Cara")]);
    test.deliver(
        "session_ended",
        json!({"results": {
            "u1": {"score": 10},
            "u2": {"score": 20},
            "u3": {"score": 10}
        }}),
    );
    let ranking = test
        .events()
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::Finalized { ranking, .. } => Some(ranking),
            _ => None,
        })
        .unwrap();
    let order: Vec<_> = ranking.iter().map(|r| r.display_name.as_str()).collect();
    assert_eq!(order, ["Bob", "Alice", "Cara"]);
}

fn final_names(test: &mut TestClient) -> Vec<String> {
    test.events()
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::Finalized { ranking, .. } => Some(ranking),
            _ => None,
        })
        .unwrap()
        .into_iter()
        .map(|r| r.display_name)
        .collect()
}

#[test]
fn tied_ids_from_one_map_rank_in_key_order() {
    let mut test = TestClient::participant();
    test.start(&[("u2", "Bob"), ("u10", "Ten"), ("u1", "Alice")]);
    test.deliver("session_ended", json!({}));
    // "u1" < "u10" < "u2" as strings
    assert_eq!(final_names(&mut test), ["Alice", "Ten", "Bob"]);
}

#[test]
fn tied_ids_rank_in_the_order_they_became_known() {
    let mut test = TestClient::participant();
    test.deliver("session_update", json!({"hp_map": {"u9": 70}}));
    test.start(&[("u1", "Alice"), ("u9", "Nina")]);
    test.deliver("session_ended", json!({}));
    assert_eq!(final_names(&mut test), ["Nina", "Alice"]);
}

#[test]
fn session_end_merges_final_health() {
    let mut test = TestClient::started();
    test.deliver(
        "session_ended",
        json!({"hp_map": {"u1": 40, "u2": 0}, "losers": ["u2"], "mode": "pvp"}),
    );
    let Some(SessionEvent::Finalized { ranking, reason }) = test.events().pop() else {
        panic!("expected a Finalized event");
    };
    assert_eq!(reason, FinalizeReason::Explicit);
    let bob = ranking.iter().find(|r| r.id.as_str() == "u2").unwrap();
    assert_eq!(bob.health, 0);
}
