//! Headless replay peer.
//!
//! Replays a scripted event stream through a real [`SessionClient`] and prints what the
//! client made of it. Useful for reproducing field reports: capture the server events of
//! a session as JSON lines, replay them here, and diff the summary.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p replay-peer -- \
//!     --script session.jsonl \
//!     --user 7 \
//!     --session ABC123 \
//!     --creator \
//!     --step-ms 250
//! ```
//!
//! # Script Format
//!
//! One JSON object per line. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"event": "session_started", "payload": {"participants": {"7": "Alice", "8": "Bob"}}}
//! {"submit": "probe the login form"}
//! {"event": "action_result", "payload": {"record": {"actor_id": "7", "payload": "probe|7||T"}}}
//! ```
//!
//! # Output
//!
//! ```json
//! {"success": true, "finalized": false, "feed": [...], "ranking": [...], "sent": [...]}
//! ```

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use coop_sync::__internal::encode;
use coop_sync::telemetry::CollectingObserver;
use coop_sync::{
    ClientBuilder, ManualClock, MemoryTransport, RankedEntry, SessionContext, SessionEvent,
    TransportRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Epoch second the replay clock starts at.
const REPLAY_EPOCH_SECS: i64 = 1_700_000_000;

/// One line of a replay script.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptLine {
    /// A server event delivered to the client.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// Free text typed by the local participant.
    Submit { submit: String },
    /// The local participant pressed "start".
    Start { start: bool },
    /// Target selection by the local participant; `null` clears it.
    Select { select: Value },
}

#[derive(Serialize)]
struct FeedLine {
    actor: String,
    message: String,
}

#[derive(Serialize)]
struct SentMessage {
    event: String,
    payload: Value,
}

#[derive(Serialize)]
struct ReplayResult {
    success: bool,
    finalized: bool,
    feed: Vec<FeedLine>,
    ranking: Vec<RankedEntry>,
    sent: Vec<SentMessage>,
    events: Vec<String>,
    violations: usize,
    rejected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReplayResult {
    fn failed(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            finalized: false,
            feed: Vec::new(),
            ranking: Vec::new(),
            sent: Vec::new(),
            events: Vec::new(),
            violations: 0,
            rejected: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug)]
struct Args {
    script: Option<String>,
    user: String,
    session: String,
    creator: bool,
    step_ms: u64,
    debug: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            script: None,
            user: "local".to_owned(),
            session: "REPLAY".to_owned(),
            creator: false,
            step_ms: 100,
            debug: false,
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut result = Args::default();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--script" => result.script = Some(value("--script")?),
            "--user" => result.user = value("--user")?,
            "--session" => result.session = value("--session")?,
            "--creator" => result.creator = true,
            "--step-ms" => {
                result.step_ms = value("--step-ms")?
                    .parse()
                    .map_err(|e| format!("invalid --step-ms: {e}"))?;
            },
            "--debug" => result.debug = true,
            other => eprintln!("Unknown argument: {other}"),
        }
    }

    Ok(result)
}

fn main() {
    let result = match parse_args() {
        Ok(args) => {
            if args.debug {
                tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new("coop_sync=trace"))
                    .with_writer(io::stderr)
                    .init();
            }
            run_replay(&args)
        },
        Err(msg) => ReplayResult::failed(msg),
    };

    let json = serde_json::to_string(&result)
        .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{e}"}}"#));
    println!("{json}");
    let _ = io::stdout().flush();

    if !result.success {
        std::process::exit(1);
    }
}

fn run_replay(args: &Args) -> ReplayResult {
    let Some(path) = &args.script else {
        return ReplayResult::failed("--script is required");
    };
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return ReplayResult::failed(format!("failed to read {path}: {e}")),
    };

    let memory = MemoryTransport::new();
    let mut registry = TransportRegistry::new();
    let transport = registry.obtain(&args.session, || memory.clone());
    let clock = ManualClock::at_epoch_secs(REPLAY_EPOCH_SECS);
    let observer = Arc::new(CollectingObserver::new());

    let context = SessionContext::new(args.session.clone(), args.creator, args.user.clone());
    let mut client = match ClientBuilder::new(context)
        .with_clock(Arc::new(clock.clone()))
        .with_violation_observer(observer.clone())
        .with_event_queue_size(10_000)
        .and_then(|builder| builder.build(&transport))
    {
        Ok(client) => client,
        Err(e) => return ReplayResult::failed(e.to_string()),
    };

    let mut events = Vec::new();
    let mut rejected = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => return ReplayResult::failed(format!("line {}: {e}", number + 1)),
        };
        tracing::debug!(line = number + 1, ?parsed, "replaying");

        match parsed {
            ScriptLine::Event { event, payload } => memory.push(event, payload),
            ScriptLine::Submit { submit } => {
                if let Err(e) = client.submit_free_text(&submit) {
                    rejected.push(format!("line {}: {e}", number + 1));
                }
            },
            ScriptLine::Select { select } => {
                client.select_target(select.as_str().map(Into::into));
            },
            ScriptLine::Start { start } => {
                if start {
                    if let Err(e) = client.request_start() {
                        rejected.push(format!("line {}: {e}", number + 1));
                    }
                }
            },
        }
        client.poll();
        clock.advance(Duration::from_millis(args.step_ms));
        events.extend(client.events().map(|event| describe(&event)));
    }
    // let timers settle after the last line
    client.poll();
    events.extend(client.events().map(|event| describe(&event)));

    let mut sent = Vec::new();
    for msg in memory.take_sent() {
        match encode(&msg) {
            Ok((event, payload)) => sent.push(SentMessage {
                event: event.to_owned(),
                payload,
            }),
            Err(e) => return ReplayResult::failed(e.to_string()),
        }
    }

    let state = client.state();
    ReplayResult {
        success: true,
        finalized: client.is_finalized(),
        feed: state
            .feed()
            .iter()
            .map(|entry| FeedLine {
                actor: entry.actor.clone(),
                message: entry.message.clone(),
            })
            .collect(),
        ranking: state.ranking(),
        sent,
        events,
        violations: observer.len(),
        rejected,
        error: None,
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connected => "connected".to_owned(),
        SessionEvent::StartAvailable { participants } => {
            format!("start_available({participants})")
        },
        SessionEvent::SessionStarted { participants } => {
            format!("session_started({participants})")
        },
        SessionEvent::SubmissionResolved {
            kind, is_correct, ..
        } => format!("resolved({kind}, {is_correct})"),
        SessionEvent::SubmissionTimedOut { kind } => format!("timed_out({kind})"),
        SessionEvent::Finalized { reason, .. } => format!("finalized({reason:?})"),
        SessionEvent::TransportError { message } => format!("error({message})"),
        other => format!("{other:?}"),
    }
}
