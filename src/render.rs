//! The presentation boundary.
//!
//! The client owns no pixels. Everything it wants shown goes through a [`RenderBridge`]:
//! feed lines, the participant list, per-participant panels, the scoreboard, outcome
//! animations and the final summary. A bridge only ever receives snapshots and ids, so it
//! cannot reach back into session state.
//!
//! Two bridges ship with the crate:
//!
//! - [`RecordingBridge`] stores every call as a [`RenderCall`] and is what tests and the
//!   replay peer use.
//! - [`TracingBridge`] logs every call at debug level, useful when embedding the client
//!   headless.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cooldown::{ActionAffordance, CooldownMap};
use crate::sessions::finalizer::RankedEntry;
use crate::{ActionKind, Participant, ParticipantId};

/// A short audio/visual cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    /// An action was sent.
    Action,
    /// An action resolved as correct.
    Success,
    /// An action resolved as incorrect.
    Failure,
}

/// How a submission ended, as far as the submitting client is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// The server resolved it as correct.
    Correct,
    /// The server resolved it as incorrect.
    Incorrect,
    /// No resolution arrived in time.
    TimedOut,
}

/// Receives render commands from the client.
///
/// Methods take `&self` so a single bridge can be shared through an `Arc` with the host.
/// Only the six core calls are required; the remaining hooks default to no-ops.
pub trait RenderBridge: Send + Sync {
    /// Appends a line to the visible event feed.
    fn render_feed_entry(&self, actor: &str, message: &str);

    /// Re-renders the list of participants.
    fn render_participants(&self, participants: &[Participant]);

    /// Refreshes the per-participant panels (health bars, cooldown badges).
    fn update_participant_panels(
        &self,
        participants: &[Participant],
        health: &BTreeMap<ParticipantId, i64>,
        cooldowns: &CooldownMap,
    );

    /// Re-renders the scoreboard.
    fn update_scoreboard(&self, scores: &BTreeMap<ParticipantId, i64>);

    /// Plays the outcome animation of a resolved action.
    fn play_outcome_effect(&self, is_correct: bool, actor: &ParticipantId, targets: &[ParticipantId]);

    /// Shows the final ranked summary.
    fn show_final_results(&self, ranking: &[RankedEntry]);

    /// Plays a short cue.
    fn play_cue(&self, _cue: Cue) {}

    /// Enables or disables the "start session" control.
    fn set_start_available(&self, _available: bool) {}

    /// Installs the action triggers once the session started.
    fn install_action_panel(&self, _kinds: &[ActionKind]) {}

    /// Refreshes enabled state and countdowns of the action triggers.
    fn update_action_affordances(&self, _affordances: &[ActionAffordance]) {}

    /// A submission of `kind` is now in flight.
    fn submission_started(&self, _kind: ActionKind) {}

    /// The in-flight submission of `kind` ended.
    fn submission_resolved(&self, _kind: ActionKind, _status: SubmissionStatus) {}

    /// Highlights the selected attack target, or clears the highlight.
    fn select_target(&self, _target: Option<&ParticipantId>) {}
}

/// A recorded [`RenderBridge`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RenderCall {
    /// [`RenderBridge::render_feed_entry`]
    FeedEntry {
        /// Who the line is attributed to.
        actor: String,
        /// The line.
        message: String,
    },
    /// [`RenderBridge::render_participants`]
    Participants {
        /// The rendered participants.
        participants: Vec<Participant>,
    },
    /// [`RenderBridge::update_participant_panels`]
    Panels {
        /// Health per participant.
        health: BTreeMap<ParticipantId, i64>,
        /// Cooldown table.
        cooldowns: CooldownMap,
    },
    /// [`RenderBridge::update_scoreboard`]
    Scoreboard {
        /// Score per participant.
        scores: BTreeMap<ParticipantId, i64>,
    },
    /// [`RenderBridge::play_outcome_effect`]
    OutcomeEffect {
        /// Whether the action was correct.
        is_correct: bool,
        /// Who acted.
        actor: ParticipantId,
        /// Who was affected.
        targets: Vec<ParticipantId>,
    },
    /// [`RenderBridge::show_final_results`]
    FinalResults {
        /// The ranking.
        ranking: Vec<RankedEntry>,
    },
    /// [`RenderBridge::play_cue`]
    Cue {
        /// The cue.
        cue: Cue,
    },
    /// [`RenderBridge::set_start_available`]
    StartAvailable {
        /// New state of the start control.
        available: bool,
    },
    /// [`RenderBridge::install_action_panel`]
    ActionPanel {
        /// Installed kinds.
        kinds: Vec<ActionKind>,
    },
    /// [`RenderBridge::update_action_affordances`]
    Affordances {
        /// One entry per kind.
        affordances: Vec<ActionAffordance>,
    },
    /// [`RenderBridge::submission_started`]
    SubmissionStarted {
        /// Kind in flight.
        kind: ActionKind,
    },
    /// [`RenderBridge::submission_resolved`]
    SubmissionResolved {
        /// Kind that ended.
        kind: ActionKind,
        /// How it ended.
        status: SubmissionStatus,
    },
    /// [`RenderBridge::select_target`]
    TargetSelected {
        /// The new target.
        target: Option<ParticipantId>,
    },
}

/// A [`RenderBridge`] that records every call.
///
/// ```
/// use coop_sync::{RecordingBridge, RenderBridge, RenderCall};
///
/// let bridge = RecordingBridge::new();
/// bridge.render_feed_entry("System", "hello");
/// assert_eq!(bridge.feed_messages(), vec!["hello".to_owned()]);
/// assert!(matches!(bridge.calls()[0], RenderCall::FeedEntry { .. }));
/// ```
#[derive(Debug, Default)]
pub struct RecordingBridge {
    calls: Mutex<Vec<RenderCall>>,
}

impl RecordingBridge {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: RenderCall) {
        self.calls.lock().push(call);
    }

    /// Returns a copy of every recorded call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    /// Removes and returns every recorded call.
    pub fn take(&self) -> Vec<RenderCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Messages of all recorded feed entries.
    #[must_use]
    pub fn feed_messages(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::FeedEntry { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&RenderCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    /// Clears all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl RenderBridge for RecordingBridge {
    fn render_feed_entry(&self, actor: &str, message: &str) {
        self.record(RenderCall::FeedEntry {
            actor: actor.to_owned(),
            message: message.to_owned(),
        });
    }

    fn render_participants(&self, participants: &[Participant]) {
        self.record(RenderCall::Participants {
            participants: participants.to_vec(),
        });
    }

    fn update_participant_panels(
        &self,
        _participants: &[Participant],
        health: &BTreeMap<ParticipantId, i64>,
        cooldowns: &CooldownMap,
    ) {
        self.record(RenderCall::Panels {
            health: health.clone(),
            cooldowns: cooldowns.clone(),
        });
    }

    fn update_scoreboard(&self, scores: &BTreeMap<ParticipantId, i64>) {
        self.record(RenderCall::Scoreboard {
            scores: scores.clone(),
        });
    }

    fn play_outcome_effect(&self, is_correct: bool, actor: &ParticipantId, targets: &[ParticipantId]) {
        self.record(RenderCall::OutcomeEffect {
            is_correct,
            actor: actor.clone(),
            targets: targets.to_vec(),
        });
    }

    fn show_final_results(&self, ranking: &[RankedEntry]) {
        self.record(RenderCall::FinalResults {
            ranking: ranking.to_vec(),
        });
    }

    fn play_cue(&self, cue: Cue) {
        self.record(RenderCall::Cue { cue });
    }

    fn set_start_available(&self, available: bool) {
        self.record(RenderCall::StartAvailable { available });
    }

    fn install_action_panel(&self, kinds: &[ActionKind]) {
        self.record(RenderCall::ActionPanel {
            kinds: kinds.to_vec(),
        });
    }

    fn update_action_affordances(&self, affordances: &[ActionAffordance]) {
        self.record(RenderCall::Affordances {
            affordances: affordances.to_vec(),
        });
    }

    fn submission_started(&self, kind: ActionKind) {
        self.record(RenderCall::SubmissionStarted { kind });
    }

    fn submission_resolved(&self, kind: ActionKind, status: SubmissionStatus) {
        self.record(RenderCall::SubmissionResolved { kind, status });
    }

    fn select_target(&self, target: Option<&ParticipantId>) {
        self.record(RenderCall::TargetSelected {
            target: target.cloned(),
        });
    }
}

/// A [`RenderBridge`] that logs every call through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBridge;

impl RenderBridge for TracingBridge {
    fn render_feed_entry(&self, actor: &str, message: &str) {
        tracing::debug!(actor, message, "feed entry");
    }

    fn render_participants(&self, participants: &[Participant]) {
        tracing::debug!(count = participants.len(), "render participants");
    }

    fn update_participant_panels(
        &self,
        participants: &[Participant],
        health: &BTreeMap<ParticipantId, i64>,
        cooldowns: &CooldownMap,
    ) {
        tracing::debug!(
            participants = participants.len(),
            ?health,
            cooldowns = cooldowns.len(),
            "update panels"
        );
    }

    fn update_scoreboard(&self, scores: &BTreeMap<ParticipantId, i64>) {
        tracing::debug!(?scores, "update scoreboard");
    }

    fn play_outcome_effect(&self, is_correct: bool, actor: &ParticipantId, targets: &[ParticipantId]) {
        tracing::debug!(is_correct, %actor, ?targets, "outcome effect");
    }

    fn show_final_results(&self, ranking: &[RankedEntry]) {
        tracing::info!(?ranking, "final results");
    }

    fn play_cue(&self, cue: Cue) {
        tracing::trace!(?cue, "cue");
    }

    fn submission_resolved(&self, kind: ActionKind, status: SubmissionStatus) {
        tracing::debug!(%kind, ?status, "submission resolved");
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn default_hooks_are_noops() {
        struct Minimal;
        impl RenderBridge for Minimal {
            fn render_feed_entry(&self, _: &str, _: &str) {}
            fn render_participants(&self, _: &[Participant]) {}
            fn update_participant_panels(
                &self,
                _: &[Participant],
                _: &BTreeMap<ParticipantId, i64>,
                _: &CooldownMap,
            ) {
            }
            fn update_scoreboard(&self, _: &BTreeMap<ParticipantId, i64>) {}
            fn play_outcome_effect(&self, _: bool, _: &ParticipantId, _: &[ParticipantId]) {}
            fn show_final_results(&self, _: &[RankedEntry]) {}
        }

        let bridge = Minimal;
        bridge.play_cue(Cue::Success);
        bridge.set_start_available(true);
        bridge.select_target(None);
    }

    #[test]
    fn recording_bridge_keeps_call_order() {
        let bridge = RecordingBridge::new();
        bridge.play_cue(Cue::Action);
        bridge.render_feed_entry("You", "Attempting: probe");
        bridge.submission_started(ActionKind::Probe);

        let calls = bridge.take();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], RenderCall::Cue { cue: Cue::Action });
        assert_eq!(
            calls[2],
            RenderCall::SubmissionStarted {
                kind: ActionKind::Probe
            }
        );
        assert!(bridge.is_empty());
    }

    #[test]
    fn count_filters_calls() {
        let bridge = RecordingBridge::new();
        bridge.update_scoreboard(&BTreeMap::new());
        bridge.update_scoreboard(&BTreeMap::new());
        bridge.play_cue(Cue::Failure);
        assert_eq!(
            bridge.count(|c| matches!(c, RenderCall::Scoreboard { .. })),
            2
        );
    }

    #[test]
    fn render_call_serializes_with_tag() {
        let json = serde_json::to_value(RenderCall::Cue { cue: Cue::Success }).unwrap();
        assert_eq!(json, serde_json::json!({"call": "cue", "cue": "success"}));
    }
}
