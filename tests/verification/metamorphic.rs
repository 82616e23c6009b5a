//! Metamorphic Testing for the state merge
//!
//! Instead of checking specific values, these tests check relationships between runs:
//! reordering independent events, or delivering them twice, must not change the
//! merged view.
//!
//! # Test Categories
//!
//! 1. **Order Insensitivity**: authoritative maps for disjoint keys commute
//! 2. **Idempotence**: duplicated delivery equals single delivery
//! 3. **Replay Consistency**: replaying the same script yields identical state

use crate::common::{action_result, record, TestClient};
use coop_sync::{FeedEntry, RankedEntry};
use serde_json::{json, Value};

type Script = Vec<(&'static str, Value)>;

fn run(script: &Script) -> TestClient {
    let mut test = TestClient::started();
    for (name, payload) in script {
        test.deliver(name, payload.clone());
    }
    test
}

fn view(test: &TestClient) -> (Vec<RankedEntry>, Vec<String>) {
    let state = test.client.state();
    let mut cooldowns: Vec<String> = state
        .cooldowns()
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    cooldowns.sort();
    (state.ranking(), cooldowns)
}

fn feed(test: &TestClient) -> Vec<FeedEntry> {
    test.client.state().feed().iter().cloned().collect()
}

#[test]
fn disjoint_snapshots_commute() {
    let a: Script = vec![
        ("session_update", json!({"scores": {"u1": 4}, "hp_map": {"u1": 80}})),
        ("session_update", json!({"scores": {"u2": 9}, "cooldowns": {"probe": 5.0}})),
    ];
    let mut b = a.clone();
    b.reverse();
    assert_eq!(view(&run(&a)), view(&run(&b)));
}

#[test]
fn duplicated_delivery_equals_single_delivery() {
    let action = action_result(&record("u2", "probe").score(6).target("u1"));
    let once: Script = vec![("action_result", action.clone())];
    let twice: Script = vec![("action_result", action.clone()), ("action_result", action)];

    let a = run(&once);
    let b = run(&twice);
    assert_eq!(view(&a), view(&b));
    assert_eq!(feed(&a), feed(&b));
}

#[test]
fn snapshot_echo_of_recent_action_is_a_no_op() {
    let action = record("u1", "exploit").score(-4).failed();
    let direct: Script = vec![("action_result", action_result(&action))];
    let echoed: Script = vec![
        ("action_result", action_result(&action)),
        ("session_update", json!({ "recent": action.to_json() })),
    ];
    assert_eq!(view(&run(&direct)), view(&run(&echoed)));
}

#[test]
fn replay_is_deterministic() {
    let script: Script = vec![
        ("action_result", action_result(&record("u1", "probe").score(5).at("A"))),
        ("action_result", action_result(&record("u2", "exploit").failed().at("B"))),
        ("session_update", json!({"cooldowns": {"u2": 12.5}})),
        ("solution_submitted", json!({"username": "Bob", "score": 3, "results": {"u2": {"score": 3}}})),
    ];
    let a = run(&script);
    let b = run(&script);
    assert_eq!(view(&a), view(&b));
    assert_eq!(feed(&a), feed(&b));
}
