//! The merged view of one session.
//!
//! [`SessionStateStore`] is the only mutable session state in the crate. Every inbound
//! event is folded in through one of its merge operations, and every merge is a partial,
//! key-wise overwrite: keys absent from the incoming map are left untouched and no merge
//! ever clears the store. Applying the same map twice gives the same state as applying it
//! once, so duplicated delivery is harmless.
//!
//! Participants are never invented locally. An id that shows up in a score, health or
//! result map (or as the actor of a record) before the server announced it is folded in
//! with its id as display name, and the event is reported as a
//! [`ViolationKind::StateMerge`] warning.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::cooldown::CooldownMap;
use crate::network::messages::{ActionRecord, HealthMap, ResultsMap, ScoreMap};
use crate::sessions::config::{FeedConfig, HealthConfig};
use crate::sessions::finalizer::RankedEntry;
use crate::telemetry::{
    report_to_observer, ContractViolation, InvariantChecker, InvariantViolation, ViolationKind,
    ViolationObserver, ViolationSeverity,
};
use crate::{Participant, ParticipantId, INLINE_TARGETS};

/// Feed attribution for lines the client itself writes.
pub const SYSTEM_ACTOR: &str = "System";
/// Feed attribution for lines the local participant caused.
pub const LOCAL_ACTOR: &str = "You";
/// Feed attribution for action records without an actor.
pub const UNKNOWN_ACTOR: &str = "Unknown";

/// One line of the display feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    /// Who the line is attributed to.
    pub actor: String,
    /// The line.
    pub message: String,
}

/// What a newly recorded action changed, for the render side.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// The recorded action.
    pub record: ActionRecord,
    /// The actor, if the record named one.
    pub actor: Option<ParticipantId>,
    /// Who the outcome animation should hit: the explicit target, or every other
    /// known participant.
    pub targets: SmallVec<[ParticipantId; INLINE_TARGETS]>,
    /// The feed line appended for the action.
    pub feed: FeedEntry,
}

/// Authoritative maps that may accompany an action record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthoritativeUpdate<'a> {
    /// Scores.
    pub scores: Option<&'a ScoreMap>,
    /// Health.
    pub health: Option<&'a HealthMap>,
    /// Cooldowns.
    pub cooldowns: Option<&'a CooldownMap>,
    /// Result summaries.
    pub results: Option<&'a ResultsMap>,
}

/// Identity of a recorded action for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordFingerprint {
    actor: Option<ParticipantId>,
    timestamp: Option<String>,
    payload: String,
}

impl RecordFingerprint {
    /// Fingerprint of `record`: its actor, timestamp and payload.
    #[must_use]
    pub fn of(record: &ActionRecord) -> Self {
        Self {
            actor: record.actor().cloned(),
            timestamp: record.timestamp.clone(),
            payload: record.payload.clone(),
        }
    }
}

/// Merged participants, scores, health, cooldowns, results and display feed.
pub struct SessionStateStore {
    session_code: String,
    order: Vec<ParticipantId>,
    names: BTreeMap<ParticipantId, String>,
    lobby: BTreeSet<String>,
    scores: ScoreMap,
    health: HealthMap,
    cooldowns: CooldownMap,
    results: ResultsMap,
    attempts: BTreeMap<ParticipantId, Value>,
    feed: VecDeque<FeedEntry>,
    seen: BTreeSet<RecordFingerprint>,
    health_config: HealthConfig,
    feed_config: FeedConfig,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl SessionStateStore {
    /// Creates an empty store for `session_code`.
    #[must_use]
    pub fn new(
        session_code: impl Into<String>,
        health_config: HealthConfig,
        feed_config: FeedConfig,
    ) -> Self {
        Self {
            session_code: session_code.into(),
            order: Vec::new(),
            names: BTreeMap::new(),
            lobby: BTreeSet::new(),
            scores: ScoreMap::new(),
            health: HealthMap::new(),
            cooldowns: CooldownMap::new(),
            results: ResultsMap::new(),
            attempts: BTreeMap::new(),
            feed: VecDeque::new(),
            seen: BTreeSet::new(),
            health_config,
            feed_config,
            observer: None,
        }
    }

    /// Routes merge violations to `observer` instead of the tracing fallback.
    #[must_use]
    pub fn with_observer(mut self, observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        self.observer = observer;
        self
    }

    fn report(&self, violation: ContractViolation) {
        report_to_observer(
            self.observer.as_ref(),
            &violation.with_session(self.session_code.clone()),
        );
    }

    /// Adds `id` if unknown. Returns `true` if it was added.
    fn fold_in(&mut self, id: &ParticipantId, name: Option<&str>, announced: bool) -> bool {
        if self.names.contains_key(id) {
            return false;
        }
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(id.as_str())
            .to_owned();
        debug!(participant = %id, %name, announced, "new participant");
        self.order.push(id.clone());
        self.names.insert(id.clone(), name);
        if !announced {
            self.report(
                ContractViolation::new(
                    ViolationSeverity::Warning,
                    ViolationKind::StateMerge,
                    "participant appeared before it was announced",
                    concat!(file!(), ":", line!()),
                )
                .with_context("participant", id.as_str()),
            );
        }
        true
    }

    // ------------------------------------------------------------------
    // merges
    // ------------------------------------------------------------------

    /// Adds or renames participants. Never removes one.
    pub fn merge_participants(&mut self, partial: &BTreeMap<ParticipantId, String>) {
        for (id, name) in partial {
            if id.is_empty() {
                continue;
            }
            if !self.fold_in(id, Some(name), true) && !name.trim().is_empty() {
                self.names.insert(id.clone(), name.clone());
            }
        }
    }

    /// Merges the display names listed by a join announcement. Returns the lobby size.
    ///
    /// The server lists usernames here, not participant ids, so nothing is folded into
    /// the participant set. Ids arrive with `session_started` or later events.
    pub fn merge_lobby(&mut self, names: &[String]) -> usize {
        for name in names {
            if !name.trim().is_empty() {
                self.lobby.insert(name.clone());
            }
        }
        self.lobby.len()
    }

    /// Stores the server's opaque attempt ids.
    pub fn merge_attempts(&mut self, partial: &BTreeMap<ParticipantId, Value>) {
        for (id, attempt) in partial {
            self.attempts.insert(id.clone(), attempt.clone());
        }
    }

    /// Overwrites the named scores.
    pub fn merge_scores(&mut self, partial: &ScoreMap) {
        for (id, score) in partial {
            if id.is_empty() {
                continue;
            }
            self.fold_in(id, None, false);
            self.scores.insert(id.clone(), *score);
        }
    }

    /// Overwrites the named health values, clamped to `0..=max_health`.
    pub fn merge_health(&mut self, partial: &HealthMap) {
        for (id, value) in partial {
            if id.is_empty() {
                continue;
            }
            self.fold_in(id, None, false);
            let clamped = self.health_config.clamp(*value);
            if clamped != *value {
                self.report(
                    ContractViolation::new(
                        ViolationSeverity::Warning,
                        ViolationKind::StateMerge,
                        "authoritative health out of range, clamped",
                        concat!(file!(), ":", line!()),
                    )
                    .with_context("participant", id.as_str())
                    .with_context("value", value.to_string()),
                );
            }
            self.health.insert(id.clone(), clamped);
        }
    }

    /// Overwrites the named cooldown expiries.
    pub fn merge_cooldowns(&mut self, partial: &CooldownMap) {
        for (key, expiry) in partial {
            self.cooldowns.insert(key.clone(), *expiry);
        }
    }

    /// Stores result summaries and folds their display names in.
    ///
    /// With `derive_scores`, entries that carry a score also overwrite the score board.
    pub fn merge_results(&mut self, partial: &ResultsMap, derive_scores: bool) {
        for (id, entry) in partial {
            if id.is_empty() {
                continue;
            }
            let name = entry.display_name().filter(|n| *n != id.as_str());
            if !self.fold_in(id, name, false) {
                if let Some(name) = name {
                    self.names.insert(id.clone(), name.to_owned());
                }
            }
            if derive_scores {
                if let Some(score) = entry.score {
                    self.scores.insert(id.clone(), score);
                }
            }
            self.results.insert(id.clone(), entry.clone());
        }
    }

    /// Applies every map of `update` that is present.
    ///
    /// Scores are derived from results only when no score map is present.
    pub fn merge_authoritative(&mut self, update: AuthoritativeUpdate<'_>) {
        if let Some(results) = update.results {
            self.merge_results(results, update.scores.is_none());
        }
        if let Some(scores) = update.scores {
            self.merge_scores(scores);
        }
        if let Some(health) = update.health {
            self.merge_health(health);
        }
        if let Some(cooldowns) = update.cooldowns {
            self.merge_cooldowns(cooldowns);
        }
    }

    /// Folds a resolved action in.
    ///
    /// The accompanying authoritative maps are always applied. The record itself is
    /// applied once per [`RecordFingerprint`]; a repeated record returns `None`.
    ///
    /// For a new record the actor's score comes from the authoritative score map, else
    /// from the actor's result entry, else `record.score` is added to the current score.
    /// If no authoritative health for the actor is present, the actor's health is
    /// adjusted by the [`HealthConfig`] heuristic. Other participants are never touched
    /// by the heuristic.
    pub fn record_action(
        &mut self,
        record: &ActionRecord,
        update: AuthoritativeUpdate<'_>,
    ) -> Option<ActionOutcome> {
        let fresh = self.seen.insert(RecordFingerprint::of(record));
        let actor = record.actor().cloned();
        if let Some(actor) = &actor {
            self.fold_in(actor, record.actor_name.as_deref(), false);
        }
        if let Some(target) = record.target() {
            let target = target.clone();
            self.fold_in(&target, None, false);
        }

        self.merge_authoritative(update);
        if !fresh {
            trace!(payload = %record.payload, "duplicate action record");
            return None;
        }

        if let Some(actor) = &actor {
            let score_known = update.scores.is_some_and(|s| s.contains_key(actor))
                || update
                    .results
                    .and_then(|r| r.get(actor))
                    .is_some_and(|e| e.score.is_some());
            if !score_known {
                let current = self.score(actor);
                self.scores
                    .insert(actor.clone(), current.saturating_add(record.score()));
            }

            let health_known = update.health.is_some_and(|h| h.contains_key(actor));
            if !health_known {
                let current = self.health(actor);
                let adjusted = if record.is_correct {
                    current.saturating_add(self.health_config.heal_amount(record.score()))
                } else {
                    current.saturating_sub(self.health_config.damage_amount(record.score()))
                };
                let adjusted = self.health_config.clamp(adjusted);
                trace!(participant = %actor, current, adjusted, "heuristic health");
                self.health.insert(actor.clone(), adjusted);
            }
        }

        let actor_label = record
            .actor_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| actor.as_ref().map(|id| self.display_name(id)))
            .unwrap_or_else(|| UNKNOWN_ACTOR.to_owned());
        let feed = self.push_feed(actor_label, record.summary());

        let targets = match record.target() {
            Some(target) => SmallVec::from_elem(target.clone(), 1),
            None => self
                .order
                .iter()
                .filter(|id| Some(*id) != actor.as_ref())
                .cloned()
                .collect(),
        };

        crate::debug_check_invariants!(self, "record_action");
        Some(ActionOutcome {
            record: record.clone(),
            actor,
            targets,
            feed,
        })
    }

    /// Appends a feed line, dropping the oldest one when full.
    pub fn push_feed(&mut self, actor: impl Into<String>, message: impl Into<String>) -> FeedEntry {
        let entry = FeedEntry {
            actor: actor.into(),
            message: message.into(),
        };
        while self.feed.len() >= self.feed_config.capacity {
            self.feed.pop_front();
        }
        self.feed.push_back(entry.clone());
        entry
    }

    // ------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------

    /// Score of `id`, 0 if none was recorded.
    #[must_use]
    pub fn score(&self, id: &ParticipantId) -> i64 {
        self.scores.get(id).copied().unwrap_or(0)
    }

    /// Health of `id`, `max_health` if none was recorded.
    #[must_use]
    pub fn health(&self, id: &ParticipantId) -> i64 {
        self.health
            .get(id)
            .copied()
            .unwrap_or(self.health_config.max_health)
    }

    /// Display name of `id`, or the id itself.
    #[must_use]
    pub fn display_name(&self, id: &ParticipantId) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether `id` is a known participant.
    #[must_use]
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.names.contains_key(id)
    }

    /// Score of every participant, defaults filled in.
    #[must_use]
    pub fn scores_view(&self) -> ScoreMap {
        self.order
            .iter()
            .map(|id| (id.clone(), self.score(id)))
            .collect()
    }

    /// Health of every participant, defaults filled in.
    #[must_use]
    pub fn health_view(&self) -> HealthMap {
        self.order
            .iter()
            .map(|id| (id.clone(), self.health(id)))
            .collect()
    }

    /// Raw recorded scores, without defaults.
    #[must_use]
    pub fn recorded_scores(&self) -> &ScoreMap {
        &self.scores
    }

    /// Raw recorded health, without defaults.
    #[must_use]
    pub fn recorded_health(&self) -> &HealthMap {
        &self.health
    }

    /// Participants in the order they became known.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.order
            .iter()
            .map(|id| Participant {
                id: id.clone(),
                display_name: self.display_name(id),
            })
            .collect()
    }

    /// Number of known participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.order.len()
    }

    /// Lobby display names seen in join announcements.
    #[must_use]
    pub fn lobby(&self) -> &BTreeSet<String> {
        &self.lobby
    }

    /// Cooldown table.
    #[must_use]
    pub fn cooldowns(&self) -> &CooldownMap {
        &self.cooldowns
    }

    /// Latest result summaries.
    #[must_use]
    pub fn results(&self) -> &ResultsMap {
        &self.results
    }

    /// Server attempt ids.
    #[must_use]
    pub fn attempts(&self) -> &BTreeMap<ParticipantId, Value> {
        &self.attempts
    }

    /// The display feed, oldest first.
    #[must_use]
    pub fn feed(&self) -> &VecDeque<FeedEntry> {
        &self.feed
    }

    /// Participants whose recorded health is 0.
    #[must_use]
    pub fn eliminated(&self) -> Vec<ParticipantId> {
        self.order
            .iter()
            .filter(|id| self.health.get(*id).is_some_and(|h| *h <= 0))
            .cloned()
            .collect()
    }

    /// Participants by descending score; ties keep participant order.
    ///
    /// Participant order is the order ids became known to this client. Ids introduced
    /// by the same payload map arrive in lexicographic order, since payload maps are
    /// decoded into ordered maps and the server's key order is not kept.
    #[must_use]
    pub fn ranking(&self) -> Vec<RankedEntry> {
        let mut ranking: Vec<RankedEntry> = self
            .order
            .iter()
            .map(|id| RankedEntry {
                id: id.clone(),
                display_name: self.display_name(id),
                score: self.score(id),
                health: self.health(id),
            })
            .collect();
        // sort_by is stable
        ranking.sort_by(|a, b| b.score.cmp(&a.score));
        ranking
    }
}

impl InvariantChecker for SessionStateStore {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.order.len() != self.names.len() {
            return Err(InvariantViolation::new(
                "SessionStateStore",
                "participant order and name map disagree",
            )
            .with_details(format!(
                "order={}, names={}",
                self.order.len(),
                self.names.len()
            )));
        }
        if let Some(id) = self.order.iter().find(|id| !self.names.contains_key(*id)) {
            return Err(
                InvariantViolation::new("SessionStateStore", "ordered id without a name")
                    .with_details(format!("id={}", id)),
            );
        }
        if let Some(id) = self.scores.keys().find(|id| !self.names.contains_key(*id)) {
            return Err(InvariantViolation::new(
                "SessionStateStore",
                "score for unknown participant",
            )
            .with_details(format!("id={}", id)));
        }
        if let Some(id) = self.health.keys().find(|id| !self.names.contains_key(*id)) {
            return Err(InvariantViolation::new(
                "SessionStateStore",
                "health for unknown participant",
            )
            .with_details(format!("id={}", id)));
        }
        let max = self.health_config.max_health;
        if let Some((id, value)) = self.health.iter().find(|(_, v)| **v < 0 || **v > max) {
            return Err(
                InvariantViolation::new("SessionStateStore", "health out of range")
                    .with_details(format!("id={}, health={}, max={}", id, value, max)),
            );
        }
        if self.feed.len() > self.feed_config.capacity {
            return Err(
                InvariantViolation::new("SessionStateStore", "feed exceeds capacity")
                    .with_details(format!(
                        "len={}, capacity={}",
                        self.feed.len(),
                        self.feed_config.capacity
                    )),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            session_code,
            order,
            names: _,
            lobby,
            scores,
            health,
            cooldowns,
            results,
            attempts: _,
            feed,
            seen,
            health_config: _,
            feed_config: _,
            observer: _,
        } = self;

        f.debug_struct("SessionStateStore")
            .field("session_code", session_code)
            .field("participants", order)
            .field("lobby", &lobby.len())
            .field("scores", scores)
            .field("health", health)
            .field("cooldowns", cooldowns)
            .field("results", &results.len())
            .field("feed", &feed.len())
            .field("seen_records", &seen.len())
            .finish_non_exhaustive()
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
    use crate::network::messages::ResultEntry;
    use crate::telemetry::CollectingObserver;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn store() -> SessionStateStore {
        SessionStateStore::new("S", HealthConfig::default(), FeedConfig::default())
    }

    fn store_with_pair() -> SessionStateStore {
        let mut store = store();
        store.merge_participants(&BTreeMap::from([
            (id("u1"), "Alice".to_owned()),
            (id("u2"), "Bob".to_owned()),
        ]));
        store
    }

    fn record(actor: &str, correct: bool, score: i64) -> ActionRecord {
        ActionRecord {
            actor_id: Some(id(actor)),
            payload: format!("probe|{}||2024-01-01T00:00:0{}Z", actor, score.rem_euclid(10)),
            is_correct: correct,
            score: Some(score),
            timestamp: Some(format!("t{}", score)),
            ..ActionRecord::default()
        }
    }

    #[test]
    fn defaults_before_first_write() {
        let store = store_with_pair();
        assert_eq!(store.score(&id("u1")), 0);
        assert_eq!(store.health(&id("u1")), 100);
        assert!(store.recorded_scores().is_empty());
        assert!(store.recorded_health().is_empty());
        assert_eq!(store.scores_view().len(), 2);
    }

    #[test]
    fn partial_merges_leave_other_keys() {
        let mut store = store_with_pair();
        store.merge_scores(&ScoreMap::from([(id("u1"), 10), (id("u2"), 3)]));
        store.merge_scores(&ScoreMap::from([(id("u2"), 7)]));
        assert_eq!(store.score(&id("u1")), 10);
        assert_eq!(store.score(&id("u2")), 7);
    }

    #[test]
    fn merge_health_is_idempotent() {
        let mut once = store_with_pair();
        once.merge_health(&HealthMap::from([(id("u1"), 40)]));
        let mut twice = store_with_pair();
        twice.merge_health(&HealthMap::from([(id("u1"), 40)]));
        twice.merge_health(&HealthMap::from([(id("u1"), 40)]));
        assert_eq!(once.health_view(), twice.health_view());
    }

    #[test]
    fn rename_never_removes() {
        let mut store = store_with_pair();
        store.merge_participants(&BTreeMap::from([(id("u1"), "Alicia".to_owned())]));
        assert_eq!(store.participant_count(), 2);
        assert_eq!(store.display_name(&id("u1")), "Alicia");
        store.merge_participants(&BTreeMap::from([(id("u1"), "  ".to_owned())]));
        assert_eq!(store.display_name(&id("u1")), "Alicia");
    }

    #[test]
    fn unknown_id_is_folded_in_and_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let mut store = store_with_pair().with_observer(Some(observer.clone()));
        store.merge_scores(&ScoreMap::from([(id("bot-9"), 4)]));
        assert!(store.contains(&id("bot-9")));
        assert_eq!(store.display_name(&id("bot-9")), "bot-9");
        crate::assert_violation!(observer, ViolationKind::StateMerge);
        assert_eq!(
            observer.violations()[0].session.as_deref(),
            Some("S")
        );
        store.check_invariants().unwrap();
    }

    #[test]
    fn out_of_range_health_is_clamped() {
        let observer = Arc::new(CollectingObserver::new());
        let mut store = store_with_pair().with_observer(Some(observer.clone()));
        store.merge_health(&HealthMap::from([(id("u1"), 140), (id("u2"), -5)]));
        assert_eq!(store.health(&id("u1")), 100);
        assert_eq!(store.health(&id("u2")), 0);
        assert_eq!(observer.len(), 2);
    }

    #[test]
    fn results_fold_names_and_derive_scores() {
        let mut store = store();
        let results = ResultsMap::from([(
            id("7"),
            ResultEntry {
                username: Some("carol".to_owned()),
                score: Some(12),
                ..ResultEntry::default()
            },
        )]);
        store.merge_results(&results, true);
        assert_eq!(store.display_name(&id("7")), "carol");
        assert_eq!(store.score(&id("7")), 12);

        store.merge_results(
            &ResultsMap::from([(
                id("7"),
                ResultEntry {
                    score: Some(20),
                    ..ResultEntry::default()
                },
            )]),
            false,
        );
        assert_eq!(store.score(&id("7")), 12);
        assert_eq!(store.display_name(&id("7")), "carol");
    }

    #[test]
    fn correct_action_heals_actor_only() {
        let mut store = store_with_pair();
        store.merge_health(&HealthMap::from([(id("u1"), 90)]));
        let outcome = store
            .record_action(&record("u1", true, 5), AuthoritativeUpdate::default())
            .unwrap();
        assert_eq!(store.health(&id("u1")), 95);
        assert_eq!(store.health(&id("u2")), 100);
        assert_eq!(store.score(&id("u1")), 5);
        assert_eq!(outcome.targets.as_slice(), &[id("u2")]);
        assert_eq!(outcome.feed.actor, "Alice");
    }

    #[test]
    fn incorrect_action_damages_actor() {
        let mut store = store_with_pair();
        store.merge_health(&HealthMap::from([(id("u1"), 90)]));
        store.record_action(&record("u1", false, 8), AuthoritativeUpdate::default());
        assert_eq!(store.health(&id("u1")), 82);
    }

    #[test]
    fn heal_is_clamped_at_max() {
        let mut store = store_with_pair();
        store.record_action(&record("u1", true, 5), AuthoritativeUpdate::default());
        assert_eq!(store.health(&id("u1")), 100);
    }

    #[test]
    fn authoritative_health_for_actor_skips_heuristic() {
        let mut store = store_with_pair();
        let hp = HealthMap::from([(id("u1"), 70)]);
        store.record_action(
            &record("u1", false, 8),
            AuthoritativeUpdate {
                health: Some(&hp),
                ..AuthoritativeUpdate::default()
            },
        );
        assert_eq!(store.health(&id("u1")), 70);
    }

    #[test]
    fn heuristic_applies_when_map_lacks_actor() {
        let mut store = store_with_pair();
        let hp = HealthMap::from([(id("u2"), 50)]);
        store.record_action(
            &record("u1", false, 8),
            AuthoritativeUpdate {
                health: Some(&hp),
                ..AuthoritativeUpdate::default()
            },
        );
        assert_eq!(store.health(&id("u1")), 92);
        assert_eq!(store.health(&id("u2")), 50);
    }

    #[test]
    fn authoritative_scores_win_over_delta() {
        let mut store = store_with_pair();
        let scores = ScoreMap::from([(id("u1"), 40)]);
        store.record_action(
            &record("u1", true, 5),
            AuthoritativeUpdate {
                scores: Some(&scores),
                ..AuthoritativeUpdate::default()
            },
        );
        assert_eq!(store.score(&id("u1")), 40);
    }

    #[test]
    fn duplicate_record_is_idempotent() {
        let mut store = store_with_pair();
        let rec = record("u1", true, 5);
        assert!(store
            .record_action(&rec, AuthoritativeUpdate::default())
            .is_some());
        assert!(store
            .record_action(&rec, AuthoritativeUpdate::default())
            .is_none());
        assert_eq!(store.score(&id("u1")), 5);
        assert_eq!(store.feed().len(), 1);
    }

    #[test]
    fn explicit_target_is_the_only_target() {
        let mut store = store_with_pair();
        let mut rec = record("u1", true, 5);
        rec.target_id = Some(id("u2"));
        let outcome = store
            .record_action(&rec, AuthoritativeUpdate::default())
            .unwrap();
        assert_eq!(outcome.targets.as_slice(), &[id("u2")]);
        assert!(!outcome.targets.spilled());
    }

    #[test]
    fn feed_drops_oldest_past_capacity() {
        let mut store = SessionStateStore::new("S", HealthConfig::default(), FeedConfig { capacity: 2 });
        store.push_feed("A", "one");
        store.push_feed("A", "two");
        store.push_feed("A", "three");
        let messages: Vec<_> = store.feed().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["two", "three"]);
    }

    #[test]
    fn ranking_sorts_by_score_then_order() {
        let mut store = store_with_pair();
        store.merge_participants(&BTreeMap::from([(id("u3"), "Cy".to_owned())]));
        store.merge_scores(&ScoreMap::from([(id("u2"), 5), (id("u3"), 5)]));
        let ranking: Vec<_> = store.ranking().into_iter().map(|r| r.id).collect();
        assert_eq!(ranking, [id("u2"), id("u3"), id("u1")]);
    }

    #[test]
    fn eliminated_only_counts_recorded_zero() {
        let mut store = store_with_pair();
        assert!(store.eliminated().is_empty());
        store.merge_health(&HealthMap::from([(id("u1"), 0), (id("u2"), 60)]));
        assert_eq!(store.eliminated(), [id("u1")]);
    }

    #[test]
    fn invariants_hold_after_mixed_merges() {
        let mut store = store_with_pair();
        store.merge_scores(&ScoreMap::from([(id("x"), 1)]));
        store.merge_health(&HealthMap::from([(id("y"), 10)]));
        store.record_action(&record("z", false, 3), AuthoritativeUpdate::default());
        store.check_invariants().unwrap();
    }
}
