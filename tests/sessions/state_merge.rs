//! Merging of server-pushed state into the client's view.

use crate::common::{action_result, record, TestClient};
use coop_sync::prelude::*;
use coop_sync::telemetry::{ViolationKind, ViolationSeverity};
use coop_sync::RenderCall;
use serde_json::json;

#[test]
fn failed_action_damages_the_actor_only() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u1": 90, "u2": 90}}));
    test.deliver(
        "action_result",
        action_result(&record("u1", "exploit").target("u2").failed().score(-8)),
    );
    assert_eq!(test.health("u1"), 82);
    assert_eq!(test.health("u2"), 90);
    assert_eq!(test.score("u1"), -8);
}

#[test]
fn heuristic_uses_defaults_for_zero_scores() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u1": 50, "u2": 50}}));
    test.deliver("action_result", action_result(&record("u1", "probe").at("A")));
    assert_eq!(test.health("u1"), 53);
    test.deliver(
        "action_result",
        action_result(&record("u2", "probe").at("B").failed()),
    );
    assert_eq!(test.health("u2"), 40);
}

#[test]
fn heuristic_caps_large_scores() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u1": 50, "u2": 50}}));
    test.deliver(
        "action_result",
        action_result(&record("u1", "probe").score(40).at("A")),
    );
    assert_eq!(test.health("u1"), 56);
    test.deliver(
        "action_result",
        action_result(&record("u2", "probe").score(40).failed().at("B")),
    );
    assert_eq!(test.health("u2"), 38);
}

#[test]
fn authoritative_maps_beat_the_heuristic() {
    let mut test = TestClient::started();
    let mut payload = action_result(&record("u1", "probe").score(5));
    payload["hp_map"] = json!({"u1": 70});
    payload["scores"] = json!({"u1": 40});
    test.deliver("action_result", payload);
    assert_eq!(test.health("u1"), 70);
    assert_eq!(test.score("u1"), 40);
}

#[test]
fn health_is_clamped_and_reported() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u1": 140, "u2": -5}}));
    assert_eq!(test.health("u1"), 100);
    assert_eq!(test.health("u2"), 0);
    coop_sync::assert_violation!(test.observer, ViolationKind::StateMerge);
}

#[test]
fn duplicate_action_is_applied_once() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u1": 50}}));
    let action = action_result(&record("u1", "probe").score(5));
    test.deliver("action_result", action.clone());
    test.deliver("action_result", action);

    assert_eq!(test.score("u1"), 5);
    assert_eq!(test.health("u1"), 55);
    assert_eq!(
        test.calls(|c| matches!(c, RenderCall::OutcomeEffect { .. })),
        1
    );
}

#[test]
fn duplicate_delivery_still_applies_its_maps() {
    let mut test = TestClient::started();
    let action = record("u1", "probe").score(5);
    test.deliver("action_result", action_result(&action));
    let mut again = action_result(&action);
    again["scores"] = json!({"u2": 9});
    test.deliver("action_result", again);
    assert_eq!(test.score("u2"), 9);
    assert_eq!(test.score("u1"), 5);
}

#[test]
fn unannounced_participant_is_folded_in() {
    let mut test = TestClient::started();
    test.deliver(
        "action_result",
        action_result(&record("bot-7", "exploit").target("u1")),
    );
    assert!(test.client.state().contains(&ParticipantId::new("bot-7")));
    assert_eq!(test.client.state().participant_count(), 3);
    let warnings = test
        .observer
        .violations_at_severity(ViolationSeverity::Warning);
    assert!(warnings.iter().any(|v| v.kind == ViolationKind::StateMerge));
}

#[test]
fn action_before_start_is_merged() {
    let mut test = TestClient::participant();
    test.deliver(
        "action_result",
        action_result(&record("u2", "probe").score(2)),
    );
    test.deliver(
        "session_started",
        crate::common::participants(&[("u1", "Alice"), ("u2", "Bob")]),
    );
    assert_eq!(test.score("u2"), 2);
    assert_eq!(test.client.state().display_name(&ParticipantId::new("u2")), "Bob");
}

#[test]
fn snapshot_without_recent_updates_panels() {
    let mut test = TestClient::started();
    test.deliver(
        "session_update",
        json!({"scores": {"u1": 10, "u2": 20}, "hp_map": {"u2": 75}}),
    );
    let panels = test
        .bridge
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RenderCall::Panels { health, .. } => Some(health),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(panels.get("u2"), Some(&75));
    assert_eq!(panels.get("u1"), Some(&100));
    assert_eq!(test.score("u2"), 20);
}

#[test]
fn results_without_scores_derive_the_scoreboard() {
    let mut test = TestClient::started();
    test.deliver(
        "session_update",
        json!({"results": {"u2": {"username": "Robert", "score": 15}}}),
    );
    assert_eq!(test.score("u2"), 15);
    assert_eq!(
        test.client.state().display_name(&ParticipantId::new("u2")),
        "Robert"
    );
}

#[test]
fn malformed_values_drop_only_their_key() {
    let mut test = TestClient::started();
    test.deliver("session_update", json!({"hp_map": {"u1": "dead"}}));
    assert_eq!(test.health("u1"), 100);
    coop_sync::assert_violation!(test.observer, ViolationKind::Payload);

    test.observer.clear();
    test.deliver(
        "session_update",
        json!({"scores": {"u1": "lots"}, "hp_map": {"u1": 40}}),
    );
    assert_eq!(test.health("u1"), 40);
    assert_eq!(test.score("u1"), 0);
    let dropped = test.observer.violations_of_kind(ViolationKind::Payload);
    assert_eq!(dropped.len(), 1);
    assert_eq!(
        dropped[0].context.get("keys").map(String::as_str),
        Some("scores")
    );

    // the session keeps going
    test.deliver("session_update", json!({"hp_map": {"u1": 60}}));
    assert_eq!(test.health("u1"), 60);
}

#[test]
fn solution_submitted_reports_and_rebuilds_scores() {
    let mut test = TestClient::started();
    test.deliver(
        "solution_submitted",
        json!({"username": "Bob", "score": 50, "results": {"u2": {"username": "Bob", "score": 50}}}),
    );
    assert_eq!(
        test.feed().last().map(String::as_str),
        Some("Bob submitted a solution — score 50")
    );
    assert_eq!(test.score("u2"), 50);
}

#[test]
fn feed_is_bounded() {
    let mut test = TestClient::build(false, |b| {
        b.with_feed_config(FeedConfig { capacity: 3 })
    });
    for i in 0..5 {
        test.deliver("error", json!({ "message": format!("e{}", i) }));
    }
    assert_eq!(test.feed(), ["Error: e2", "Error: e3", "Error: e4"]);
}
