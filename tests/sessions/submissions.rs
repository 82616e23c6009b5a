//! The one-in-flight submission discipline.

use crate::common::{action_result, record, TestClient, EPOCH_SECS, SESSION_CODE};
use coop_sync::prelude::*;
use coop_sync::telemetry::ViolationKind;
use coop_sync::{OutboundMessage, RenderCall};
use serde_json::json;
use web_time::Duration;

fn sent_action(test: &TestClient) -> String {
    match test.sent().as_slice() {
        [OutboundMessage::PlayAction {
            session_code,
            action,
        }] => {
            assert_eq!(session_code, SESSION_CODE);
            action.clone()
        },
        other => panic!("expected exactly one play_action, got {:?}", other),
    }
}

#[test]
fn submit_before_start_is_refused() {
    let mut test = TestClient::participant();
    assert_eq!(
        test.client.submit(ActionKind::Exploit),
        Err(SessionError::NotStarted)
    );
    assert!(test.sent().is_empty());
}

#[test]
fn submit_composes_payload_with_target() {
    let mut test = TestClient::started();
    test.client.select_target(Some(ParticipantId::new("u2")));
    test.client.submit(ActionKind::Exploit).unwrap();

    assert_eq!(sent_action(&test), "exploit|u1|u2|2023-11-14T22:13:20.000Z");
    assert_eq!(test.feed().last().map(String::as_str), Some("Attempting: exploit"));
    assert_eq!(
        test.calls(|c| matches!(c, RenderCall::TargetSelected { target: Some(_) })),
        1
    );
    assert_eq!(
        test.calls(|c| matches!(
            c,
            RenderCall::SubmissionStarted {
                kind: ActionKind::Exploit
            }
        )),
        1
    );
}

#[test]
fn only_one_submission_in_flight() {
    let mut test = TestClient::started();
    test.client.submit(ActionKind::Probe).unwrap();
    assert_eq!(
        test.client.hotkey(2),
        Err(SessionError::SubmissionPending {
            kind: ActionKind::Probe
        })
    );
    assert_eq!(test.sent().len(), 1);
}

#[test]
fn resolution_clears_pending_and_reports() {
    let mut test = TestClient::started();
    test.client.submit(ActionKind::Probe).unwrap();
    let sent = sent_action(&test);

    test.deliver(
        "action_result",
        action_result(&record("u1", "probe").score(4).echoing(&sent)),
    );
    assert!(test.client.pending_submission().is_none());
    assert!(test.events().contains(&SessionEvent::SubmissionResolved {
        kind: ActionKind::Probe,
        is_correct: true,
        score: 4,
    }));
    assert_eq!(
        test.calls(|c| matches!(
            c,
            RenderCall::SubmissionResolved {
                status: SubmissionStatus::Correct,
                ..
            }
        )),
        1
    );
    test.client.submit(ActionKind::Sanitize).unwrap();
}

#[test]
fn someone_elses_action_does_not_resolve() {
    let mut test = TestClient::started();
    test.client.submit(ActionKind::Probe).unwrap();
    test.deliver("action_result", action_result(&record("u2", "probe")));
    assert!(test.client.pending_submission().is_some());
}

#[test]
fn timeout_fires_at_four_seconds() {
    let mut test = TestClient::started();
    test.client.submit(ActionKind::Report).unwrap();

    test.advance_ms(3999);
    assert!(test.client.pending_submission().is_some());
    assert!(!test
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::SubmissionTimedOut { .. })));

    test.advance_ms(1);
    assert!(test.client.pending_submission().is_none());
    assert!(test.events().contains(&SessionEvent::SubmissionTimedOut {
        kind: ActionKind::Report
    }));
    let last = test.client.state().feed().back().cloned().unwrap();
    assert_eq!(last.actor, "System");
    assert_eq!(last.message, "report timed out");
    assert_eq!(
        test.calls(|c| matches!(
            c,
            RenderCall::SubmissionResolved {
                status: SubmissionStatus::TimedOut,
                ..
            }
        )),
        1
    );

    // capability is restored
    test.client.submit(ActionKind::Report).unwrap();
}

#[test]
fn late_resolution_is_merged_and_reported() {
    let mut test = TestClient::started();
    test.client.submit(ActionKind::Probe).unwrap();
    let sent = sent_action(&test);
    test.advance_ms(4000);
    test.events();

    test.deliver(
        "action_result",
        action_result(&record("u1", "probe").score(3).echoing(&sent)),
    );
    assert_eq!(test.score("u1"), 3);
    assert!(!test
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::SubmissionResolved { .. })));
    coop_sync::assert_violation!(test.observer, ViolationKind::Submission);
}

#[test]
fn late_resolution_does_not_cancel_resubmission() {
    let mut test = TestClient::started();
    test.client.submit(ActionKind::Probe).unwrap();
    let first = sent_action(&test);
    test.advance_ms(4000);
    test.clock.advance(Duration::from_millis(10));
    let second_handle = test.client.submit(ActionKind::Probe).unwrap();
    let second = sent_action(&test);
    assert_ne!(first, second);
    test.events();

    test.deliver(
        "action_result",
        action_result(&record("u1", "probe").score(2).echoing(&first)),
    );
    assert_eq!(test.score("u1"), 2);
    assert_eq!(
        test.client.pending_submission().map(|p| p.handle),
        Some(second_handle)
    );
    assert!(!test
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::SubmissionResolved { .. })));
    coop_sync::assert_violation!(test.observer, ViolationKind::Submission);

    test.deliver(
        "action_result",
        action_result(&record("u1", "probe").score(5).at("later").echoing(&second)),
    );
    assert!(test.client.pending_submission().is_none());
    assert!(test.events().contains(&SessionEvent::SubmissionResolved {
        kind: ActionKind::Probe,
        is_correct: true,
        score: 5,
    }));
}

#[test]
fn cooling_down_kind_is_refused() {
    let mut test = TestClient::started();
    let until = EPOCH_SECS as f64 + 5.0;
    test.deliver("session_update", json!({"cooldowns": {"monitor": until}}));

    assert_eq!(
        test.client.submit(ActionKind::Monitor),
        Err(SessionError::CoolingDown {
            kind: ActionKind::Monitor,
            remaining_secs: 5
        })
    );
    assert!(test.sent().is_empty());
    test.client.submit(ActionKind::Probe).unwrap();
}

#[test]
fn actor_cooldown_blocks_every_kind() {
    let mut test = TestClient::started();
    let until = EPOCH_SECS as f64 + 2.0;
    test.deliver("session_update", json!({"cooldowns": {"u1": until}}));
    assert!(matches!(
        test.client.submit(ActionKind::Sanitize),
        Err(SessionError::CoolingDown { .. })
    ));
    test.advance_ms(2000);
    test.client.submit(ActionKind::Sanitize).unwrap();
}

#[test]
fn free_text_picks_kind_from_first_word() {
    let mut test = TestClient::started();
    test.client
        .submit_free_text("  Probe the login form ")
        .unwrap()
        .unwrap();
    assert_eq!(
        sent_action(&test),
        "probe|u1||2023-11-14T22:13:20.000Z|the login form"
    );
}

#[test]
fn free_text_without_kind_is_an_exploit() {
    let mut test = TestClient::started();
    test.client.submit_free_text("' OR 1=1 --").unwrap().unwrap();
    assert_eq!(
        sent_action(&test),
        "exploit|u1||2023-11-14T22:13:20.000Z|' OR 1=1 --"
    );
}

#[test]
fn blank_free_text_is_ignored() {
    let mut test = TestClient::started();
    assert_eq!(test.client.submit_free_text("   "), Ok(None));
    assert!(test.sent().is_empty());
    assert!(test.client.pending_submission().is_none());
}

#[test]
fn hotkeys_map_to_kinds() {
    let mut test = TestClient::started();
    assert!(matches!(
        test.client.hotkey(0),
        Err(SessionError::InvalidRequest { .. })
    ));
    test.client.hotkey(4).unwrap();
    assert_eq!(
        test.client.pending_submission().map(|p| p.kind),
        Some(ActionKind::Monitor)
    );
}

#[test]
fn closed_transport_fails_submission_without_pending() {
    let mut test = TestClient::started();
    test.memory.close();
    assert!(matches!(
        test.client.submit(ActionKind::Probe),
        Err(SessionError::Transport { .. })
    ));
    assert!(test.client.pending_submission().is_none());
    assert!(matches!(
        test.events().as_slice(),
        [SessionEvent::TransportError { .. }]
    ));
    assert!(test
        .feed()
        .last()
        .is_some_and(|line| line.starts_with("Error: ")));
}

#[test]
fn finished_session_refuses_submissions() {
    let mut test = TestClient::started();
    test.deliver("session_ended", json!({}));
    assert!(matches!(
        test.client.submit(ActionKind::Probe),
        Err(SessionError::InvalidRequest {
            kind: InvalidRequestKind::SessionFinished
        })
    ));
}
