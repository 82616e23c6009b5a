use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::SessionEvent;

/// A zero-allocation opaque iterator that drains events from a client.
///
/// This type wraps the internal event queue drain, providing a stable public API
/// that doesn't expose `std::collections::vec_deque::Drain` directly. It implements
/// [`Iterator`], [`DoubleEndedIterator`], [`ExactSizeIterator`], and [`FusedIterator`].
///
/// Obtain an `EventDrain` by calling [`SessionClient::events()`].
///
/// # Examples
///
/// ```ignore
/// for event in client.events() {
///     match event {
///         SessionEvent::SubmissionTimedOut { kind } => {
///             println!("{kind} timed out, try again");
///         }
///         _ => { /* handle other events */ }
///     }
/// }
/// ```
///
/// [`SessionClient::events()`]: crate::SessionClient::events
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: Drain<'a, SessionEvent>,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, SessionEvent>) -> Self {
        Self { inner: drain }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = SessionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::iter_with_drain
)]
mod tests {
    use super::*;
    use crate::ActionKind;
    use std::collections::VecDeque;

    fn queue() -> VecDeque<SessionEvent> {
        VecDeque::from(vec![
            SessionEvent::Connected,
            SessionEvent::SubmissionTimedOut {
                kind: ActionKind::Probe,
            },
            SessionEvent::TransportError {
                message: "boom".to_owned(),
            },
        ])
    }

    #[test]
    fn drains_in_order_and_empties_queue() {
        let mut events = queue();
        let drained: Vec<_> = EventDrain::from_drain(events.drain(..)).collect();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], SessionEvent::Connected);
        assert!(events.is_empty());
    }

    #[test]
    fn exact_size_and_reverse() {
        let mut events = queue();
        let mut drain = EventDrain::from_drain(events.drain(..));
        assert_eq!(drain.len(), 3);
        assert!(matches!(
            drain.next_back(),
            Some(SessionEvent::TransportError { .. })
        ));
        assert_eq!(drain.len(), 2);
    }

    #[test]
    fn fused_after_exhaustion() {
        let mut events = VecDeque::new();
        let mut drain = EventDrain::from_drain(events.drain(..));
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
        assert_eq!(format!("{:?}", drain), "EventDrain { remaining: 0 }");
    }
}
