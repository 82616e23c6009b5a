//! Cooldown lookups.
//!
//! The server hands out cooldowns as absolute Unix timestamps (seconds) after which an
//! action may be submitted again. It keys them by action kind, and in practice also by
//! actor id. Everything here is a pure read over that table: nothing in this module
//! creates or extends a cooldown.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{ActionKind, ParticipantId};

/// Server-supplied cooldown expiries, keyed by action kind or participant id.
pub type CooldownMap = BTreeMap<String, f64>;

/// Availability of one action kind as derived from the cooldown table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionAffordance {
    /// The action kind.
    pub kind: ActionKind,
    /// Whether the trigger for this kind should be enabled.
    pub enabled: bool,
    /// Whole seconds until the kind is ready again (0 when ready).
    pub remaining_secs: u64,
}

/// Read-only view over a [`CooldownMap`].
///
/// ```
/// use coop_sync::{CooldownMap, CooldownTracker};
///
/// let mut map = CooldownMap::new();
/// map.insert("probe".to_owned(), 103.0);
/// let tracker = CooldownTracker::new(&map);
///
/// assert!(!tracker.is_ready("probe", 100.5));
/// assert_eq!(tracker.remaining_secs("probe", 100.5), 3);
/// assert!(tracker.is_ready("exploit", 100.5));
/// assert_eq!(tracker.remaining_secs("probe", 200.0), 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CooldownTracker<'a> {
    map: &'a CooldownMap,
}

impl<'a> CooldownTracker<'a> {
    /// Wraps a cooldown table.
    #[must_use]
    pub fn new(map: &'a CooldownMap) -> Self {
        Self { map }
    }

    /// Returns `true` if `key` has no entry or its expiry is not in the future.
    #[must_use]
    pub fn is_ready(&self, key: &str, now_secs: f64) -> bool {
        self.remaining_secs(key, now_secs) == 0
    }

    /// Whole seconds (rounded up) until `key` becomes ready; 0 if it already is.
    #[must_use]
    pub fn remaining_secs(&self, key: &str, now_secs: f64) -> u64 {
        let Some(&expires_at) = self.map.get(key) else {
            return 0;
        };
        let delta = expires_at - now_secs;
        if delta.is_nan() || delta <= 0.0 {
            0
        } else {
            delta.ceil() as u64
        }
    }

    /// Remaining seconds for `kind` when submitted by `actor`.
    ///
    /// Both the kind entry and the actor entry gate the submission; the longer one wins.
    #[must_use]
    pub fn remaining_for(&self, kind: ActionKind, actor: &ParticipantId, now_secs: f64) -> u64 {
        self.remaining_secs(kind.as_str(), now_secs)
            .max(self.remaining_secs(actor.as_str(), now_secs))
    }

    /// Derives one affordance per action kind.
    ///
    /// A kind is enabled when it is ready and no submission is pending.
    #[must_use]
    pub fn affordances(
        &self,
        actor: &ParticipantId,
        now_secs: f64,
        submission_pending: bool,
    ) -> Vec<ActionAffordance> {
        ActionKind::ALL
            .into_iter()
            .map(|kind| {
                let remaining_secs = self.remaining_for(kind, actor, now_secs);
                ActionAffordance {
                    kind,
                    enabled: remaining_secs == 0 && !submission_pending,
                    remaining_secs,
                }
            })
            .collect()
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

    fn map(entries: &[(&str, f64)]) -> CooldownMap {
        entries.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn absent_entry_is_ready() {
        let table = CooldownMap::new();
        let tracker = CooldownTracker::new(&table);
        assert!(tracker.is_ready("probe", 0.0));
        assert_eq!(tracker.remaining_secs("probe", 0.0), 0);
    }

    #[test]
    fn expiry_equal_to_now_is_ready() {
        let table = map(&[("probe", 50.0)]);
        assert!(CooldownTracker::new(&table).is_ready("probe", 50.0));
    }

    #[test]
    fn remaining_rounds_up() {
        let table = map(&[("probe", 50.0)]);
        let tracker = CooldownTracker::new(&table);
        assert_eq!(tracker.remaining_secs("probe", 49.9), 1);
        assert_eq!(tracker.remaining_secs("probe", 47.0), 3);
    }

    #[test]
    fn nan_expiry_is_ready() {
        let table = map(&[("probe", f64::NAN)]);
        assert!(CooldownTracker::new(&table).is_ready("probe", 1.0));
    }

    #[test]
    fn actor_entry_gates_every_kind() {
        let table = map(&[("u1", 13.0), ("report", 20.0)]);
        let tracker = CooldownTracker::new(&table);
        let actor = ParticipantId::new("u1");

        assert_eq!(tracker.remaining_for(ActionKind::Probe, &actor, 10.0), 3);
        assert_eq!(tracker.remaining_for(ActionKind::Report, &actor, 10.0), 10);

        let other = ParticipantId::new("u2");
        assert_eq!(tracker.remaining_for(ActionKind::Probe, &other, 10.0), 0);
    }

    #[test]
    fn affordances_disable_everything_while_pending() {
        let table = CooldownMap::new();
        let tracker = CooldownTracker::new(&table);
        let actor = ParticipantId::new("u1");

        let idle = tracker.affordances(&actor, 0.0, false);
        assert_eq!(idle.len(), ActionKind::ALL.len());
        assert!(idle.iter().all(|a| a.enabled));

        let pending = tracker.affordances(&actor, 0.0, true);
        assert!(pending.iter().all(|a| !a.enabled && a.remaining_secs == 0));
    }

    #[test]
    fn affordances_report_remaining_per_kind() {
        let table = map(&[("monitor", 5.0)]);
        let tracker = CooldownTracker::new(&table);
        let affordances = tracker.affordances(&ParticipantId::new("u1"), 3.5, false);
        let monitor = affordances
            .iter()
            .find(|a| a.kind == ActionKind::Monitor)
            .unwrap();
        assert!(!monitor.enabled);
        assert_eq!(monitor.remaining_secs, 2);
    }
}
