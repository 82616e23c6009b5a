//! One router per transport instance.

use crate::common::{TestClient, SESSION_CODE};
use coop_sync::prelude::*;
use coop_sync::telemetry::ViolationKind;
use serde_json::json;

#[test]
fn second_client_on_same_transport_stays_unbound() {
    let first = TestClient::participant();
    let mut second = TestClient::on_transport(
        false,
        first.memory.clone(),
        first.transport.clone(),
        |builder| builder,
    );

    assert_eq!(first.client.router_state(), RouterState::Bound);
    assert_eq!(second.client.router_state(), RouterState::Unbound);
    coop_sync::assert_violation!(second.observer, ViolationKind::Binding);

    // the unbound client never drains the shared connection
    first.memory.push("connect", json!({}));
    second.client.poll();
    assert_eq!(first.memory.pending_inbound(), 1);
    assert!(second.client.state().feed().is_empty());
}

#[test]
fn unbound_client_refuses_to_act() {
    let first = TestClient::participant();
    let mut second = TestClient::on_transport(
        true,
        first.memory.clone(),
        first.transport.clone(),
        |builder| builder,
    );
    assert_eq!(
        second.client.submit(ActionKind::Probe),
        Err(SessionError::NotBound)
    );
    assert_eq!(second.client.request_start(), Err(SessionError::NotBound));
    assert!(first.memory.sent().is_empty());
}

#[test]
fn each_event_is_processed_once() {
    let mut first = TestClient::participant();
    let _second = TestClient::on_transport(
        false,
        first.memory.clone(),
        first.transport.clone(),
        |builder| builder,
    );
    first.deliver("connect", json!({}));
    assert_eq!(first.feed(), ["Connected to server"]);
    assert_eq!(first.sent().len(), 1);
}

#[test]
fn registry_hands_out_one_transport_per_session() {
    let mut registry = TransportRegistry::new();
    let memory = MemoryTransport::new();
    let a = registry.obtain(SESSION_CODE, || memory.clone());
    let b = registry.obtain(SESSION_CODE, MemoryTransport::new);
    assert!(a.same_transport(&b));

    let context = SessionContext::new(SESSION_CODE, false, "u1");
    let first = ClientBuilder::new(context.clone()).build(&a).unwrap();
    let second = ClientBuilder::new(context).build(&b).unwrap();
    assert_eq!(first.router_state(), RouterState::Bound);
    assert_eq!(second.router_state(), RouterState::Unbound);
}

#[test]
fn reinitialized_client_binds_after_the_first_is_dropped() {
    let first = TestClient::participant();
    let memory = first.memory.clone();
    let transport = first.transport.clone();
    drop(first);

    let mut second = TestClient::on_transport(false, memory, transport, |builder| builder);
    assert_eq!(second.client.router_state(), RouterState::Bound);
    assert!(second.observer.is_empty());

    second.deliver("connect", json!({}));
    assert_eq!(second.feed(), ["Connected to server"]);
    assert_eq!(second.sent().len(), 1);
    assert_eq!(second.memory.pending_inbound(), 0);
}

#[test]
fn unbound_client_takes_over_on_poll() {
    let first = TestClient::participant();
    let mut second = TestClient::on_transport(
        false,
        first.memory.clone(),
        first.transport.clone(),
        |builder| builder,
    );
    assert_eq!(second.client.router_state(), RouterState::Unbound);
    drop(first);

    second.deliver("connect", json!({}));
    assert_eq!(second.client.router_state(), RouterState::Bound);
    assert_eq!(second.feed(), ["Connected to server"]);
    assert_eq!(second.memory.pending_inbound(), 0);
}
