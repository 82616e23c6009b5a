//! Fuzz target for inbound event decoding.
//!
//! Feeds arbitrary event names and JSON payloads through the decoder and then through a
//! live client, so both the codec and every handler see malformed data.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary payloads, including wrong JSON types
//! - Undecodable events are dropped without disturbing the session
//! - The host event queue never grows past its bound

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use coop_sync::__internal::decode;
use coop_sync::telemetry::CollectingObserver;
use coop_sync::{ClientBuilder, InboundFrame, ManualClock, MemoryTransport, SessionContext, SharedTransport};

const EVENT_NAMES: [&str; 10] = [
    "connect",
    "connect_response",
    "user_joined",
    "session_started",
    "action_result",
    "session_update",
    "solution_submitted",
    "session_ended",
    "error",
    "unknown_event",
];

#[derive(Debug, Arbitrary)]
struct FuzzFrame {
    name_index: u8,
    payload: Vec<u8>,
    advance_ms: u16,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    is_creator: bool,
    frames: Vec<FuzzFrame>,
}

fuzz_target!(|input: FuzzInput| {
    let memory = MemoryTransport::new();
    let transport = SharedTransport::new(memory.clone());
    let clock = ManualClock::at_epoch_secs(1_700_000_000);
    let Ok(mut client) = ClientBuilder::new(SessionContext::new("FUZZ", input.is_creator, "u1"))
        .with_clock(Arc::new(clock.clone()))
        .with_violation_observer(Arc::new(CollectingObserver::new()))
        .with_event_queue_size(10)
        .and_then(|builder| builder.build(&transport))
    else {
        return;
    };

    for fuzz in input.frames.iter().take(64) {
        let name = EVENT_NAMES[fuzz.name_index as usize % EVENT_NAMES.len()];
        // Non-JSON bytes become a string payload, which most events reject
        let payload = serde_json::from_slice(&fuzz.payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&fuzz.payload).into_owned())
        });
        let frame = InboundFrame::new(name, payload);

        let _decoded = decode(&frame);

        memory.push_frame(frame);
        client.poll();
        clock.advance(std::time::Duration::from_millis(u64::from(fuzz.advance_ms)));
        assert!(client.events().count() <= 10);
    }
});
