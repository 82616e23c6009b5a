//! Fuzz target for pipe-delimited action payloads.
//!
//! # Safety Properties Tested
//! - Parsing never panics, whatever the separators or UTF-8 content
//! - A parsed payload recomposes to a string that parses to the same segments

#![no_main]

use libfuzzer_sys::fuzz_target;

use coop_sync::__internal::{compose_action_payload, parse_action_payload};

fuzz_target!(|data: &str| {
    let Some(parsed) = parse_action_payload(data) else {
        assert!(data.is_empty());
        return;
    };

    let (Some(kind), Some(actor), Some(timestamp)) =
        (parsed.kind, parsed.actor.as_ref(), parsed.timestamp.as_deref())
    else {
        return;
    };
    let composed = compose_action_payload(
        kind,
        actor,
        parsed.target.as_ref(),
        timestamp,
        parsed.body.as_deref(),
    );
    let reparsed = parse_action_payload(&composed);
    assert_eq!(reparsed.as_ref().and_then(|p| p.kind), Some(kind));
    assert_eq!(reparsed.as_ref().and_then(|p| p.actor.as_ref()), Some(actor));
});
