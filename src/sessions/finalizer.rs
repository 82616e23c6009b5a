use serde::Serialize;

use crate::sessions::state_store::SessionStateStore;
use crate::ParticipantId;

/// One row of the final summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    /// Participant id.
    pub id: ParticipantId,
    /// Display name at the time of ranking.
    pub display_name: String,
    /// Final score.
    pub score: i64,
    /// Final health.
    pub health: i64,
}

/// Why the final summary was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    /// The server sent `session_ended`.
    Explicit,
    /// A participant's health reached zero locally.
    Elimination,
}

/// Shows the final summary at most once.
///
/// Elimination is inferred from locally merged health and only ever triggers this
/// one-shot display; it gates no other transition.
///
/// ```
/// use coop_sync::{FeedConfig, HealthConfig, ResultFinalizer, SessionStateStore};
/// use coop_sync::__internal::HealthMap;
/// use coop_sync::ParticipantId;
///
/// let mut store = SessionStateStore::new("S", HealthConfig::default(), FeedConfig::default());
/// let mut finalizer = ResultFinalizer::new();
/// assert!(finalizer.check(&store).is_none());
///
/// store.merge_health(&HealthMap::from([(ParticipantId::new("u1"), 0)]));
/// assert!(finalizer.check(&store).is_some());
/// assert!(finalizer.check(&store).is_none());
/// assert!(finalizer.force(&store).is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ResultFinalizer {
    shown: Option<FinalizeReason>,
}

impl ResultFinalizer {
    /// Creates a finalizer that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ranking if a participant is eliminated and nothing was shown yet.
    pub fn check(&mut self, store: &SessionStateStore) -> Option<Vec<RankedEntry>> {
        if self.shown.is_some() || store.eliminated().is_empty() {
            return None;
        }
        self.fire(store, FinalizeReason::Elimination)
    }

    /// Returns the ranking unless something was shown already.
    pub fn force(&mut self, store: &SessionStateStore) -> Option<Vec<RankedEntry>> {
        self.fire(store, FinalizeReason::Explicit)
    }

    fn fire(&mut self, store: &SessionStateStore, reason: FinalizeReason) -> Option<Vec<RankedEntry>> {
        if self.shown.is_some() {
            tracing::trace!(?reason, "final summary already shown");
            return None;
        }
        tracing::debug!(?reason, "finalizing session");
        self.shown = Some(reason);
        Some(store.ranking())
    }

    /// Whether the summary was shown.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.shown.is_some()
    }

    /// The reason the summary was shown, if it was.
    #[must_use]
    pub fn reason(&self) -> Option<FinalizeReason> {
        self.shown
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
    use crate::network::messages::{HealthMap, ScoreMap};
    use crate::{FeedConfig, HealthConfig};
    use std::collections::BTreeMap;

    fn store() -> SessionStateStore {
        let mut store = SessionStateStore::new("S", HealthConfig::default(), FeedConfig::default());
        store.merge_participants(&BTreeMap::from([
            (ParticipantId::new("u1"), "Alice".to_owned()),
            (ParticipantId::new("u2"), "Bob".to_owned()),
        ]));
        store
    }

    #[test]
    fn elimination_fires_once() {
        let mut store = store();
        let mut finalizer = ResultFinalizer::new();
        store.merge_health(&HealthMap::from([
            (ParticipantId::new("u1"), 0),
            (ParticipantId::new("u2"), 60),
        ]));
        assert!(finalizer.check(&store).is_some());
        store.merge_health(&HealthMap::from([(ParticipantId::new("u1"), 0)]));
        assert!(finalizer.check(&store).is_none());
        assert_eq!(finalizer.reason(), Some(FinalizeReason::Elimination));
    }

    #[test]
    fn explicit_end_ranks_by_score() {
        let mut store = store();
        store.merge_scores(&ScoreMap::from([(ParticipantId::new("u2"), 9)]));
        let mut finalizer = ResultFinalizer::new();
        let ranking = finalizer.force(&store).unwrap();
        assert_eq!(ranking[0].display_name, "Bob");
        assert_eq!(ranking[1].score, 0);
        assert!(finalizer.is_finalized());
        assert!(finalizer.force(&store).is_none());
    }

    #[test]
    fn healthy_store_does_not_finalize() {
        let store = store();
        let mut finalizer = ResultFinalizer::new();
        assert!(finalizer.check(&store).is_none());
        assert!(!finalizer.is_finalized());
    }
}
