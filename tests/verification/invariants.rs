//! Runtime invariants of the state store under scripted sessions.

use crate::common::{action_result, record, TestClient};
use coop_sync::telemetry::InvariantChecker;
use serde_json::json;

fn assert_store_invariants(test: &TestClient) {
    if let Err(violation) = test.client.state().check_invariants() {
        panic!("invariant broken: {}", violation);
    }
}

#[test]
fn invariants_hold_through_a_session() {
    let mut test = TestClient::participant();
    test.deliver("connect", json!({}));
    assert_store_invariants(&test);
    test.deliver(
        "user_joined",
        json!({"username": "bob", "participants": ["alice", "bob"]}),
    );
    assert_store_invariants(&test);
    test.start(&[("u1", "Alice"), ("u2", "Bob")]);
    assert_store_invariants(&test);

    for (i, actor) in ["u1", "u2", "bot-1", "u2"].iter().enumerate() {
        let action = record(actor, "exploit")
            .score(i as i64 * 7 - 10)
            .at(&format!("T{}", i));
        test.deliver("action_result", action_result(&action));
        assert_store_invariants(&test);
    }

    test.deliver(
        "session_update",
        json!({"hp_map": {"ghost": 500}, "scores": {"ghost": 1}}),
    );
    assert_store_invariants(&test);
    test.deliver("session_ended", json!({"results": {"u3": {"score": 4}}}));
    assert_store_invariants(&test);
}

#[test]
fn health_stays_within_bounds() {
    let mut test = TestClient::started();
    for i in 0..30 {
        let mut action = record("u1", "probe").score(100).at(&format!("T{}", i));
        if i % 3 == 0 {
            action = action.failed();
        }
        test.deliver("action_result", action_result(&action));
        let health = test.health("u1");
        assert!((0..=100).contains(&health), "health {} out of range", health);
    }
}

#[test]
fn no_violations_in_a_clean_session() {
    let mut test = TestClient::started();
    test.deliver(
        "action_result",
        action_result(&record("u2", "probe").target("u1").score(3)),
    );
    test.deliver("session_update", json!({"hp_map": {"u1": 90, "u2": 99}}));
    coop_sync::assert_no_violations!(test.observer);
}
