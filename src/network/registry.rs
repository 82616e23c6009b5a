//! Ownership of transports across (re)initializations.
//!
//! A host page may run its initialization routine more than once while keeping the same
//! connection. Handlers must only ever be attached once per connection, otherwise every
//! event would be processed once per initialization. The "already bound" flag therefore
//! lives with the transport, inside [`SharedTransport`], and the [`TransportRegistry`]
//! hands out the same [`SharedTransport`] for every initialization of a session code.
//!
//! Binding hands out a [`TransportBinding`]. The flag stays set for as long as that guard
//! lives, so a client that is dropped on re-initialization frees the connection for the
//! client that replaces it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::messages::{InboundFrame, OutboundMessage};
use crate::{SessionError, Transport};

struct TransportSlot {
    transport: Box<dyn Transport>,
    bound: bool,
}

/// A transport plus its binding flag, shared by every client initialized against it.
#[derive(Clone)]
pub struct SharedTransport {
    slot: Arc<Mutex<TransportSlot>>,
}

impl SharedTransport {
    /// Wraps a transport. The result starts unbound.
    #[must_use]
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(TransportSlot {
                transport: Box::new(transport),
                bound: false,
            })),
        }
    }

    /// Marks the transport as bound.
    ///
    /// Returns a guard if no other guard for this transport instance is alive. The
    /// transport is released when the guard is dropped.
    #[must_use = "the transport is released as soon as the binding is dropped"]
    pub fn try_bind(&self) -> Option<TransportBinding> {
        let mut slot = self.slot.lock();
        if slot.bound {
            return None;
        }
        slot.bound = true;
        Some(TransportBinding {
            slot: Arc::clone(&self.slot),
        })
    }

    /// Whether a client already bound this transport.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot.lock().bound
    }

    /// Sends a message through the wrapped transport.
    ///
    /// # Errors
    ///
    /// Forwards the wrapped transport's error.
    pub fn emit(&self, msg: &OutboundMessage) -> Result<(), SessionError> {
        self.slot.lock().transport.emit(msg)
    }

    /// Drains the wrapped transport.
    #[must_use]
    pub fn receive_all_events(&self) -> Vec<InboundFrame> {
        self.slot.lock().transport.receive_all_events()
    }

    /// Whether two handles refer to the same transport instance.
    #[must_use]
    pub fn same_transport(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTransport")
            .field("bound", &self.is_bound())
            .field("handles", &Arc::strong_count(&self.slot))
            .finish_non_exhaustive()
    }
}

/// Exclusive right to drain a [`SharedTransport`].
///
/// Dropping it clears the transport's bound flag.
pub struct TransportBinding {
    slot: Arc<Mutex<TransportSlot>>,
}

impl TransportBinding {
    /// Whether this binding belongs to `transport`.
    #[must_use]
    pub fn is_for(&self, transport: &SharedTransport) -> bool {
        Arc::ptr_eq(&self.slot, &transport.slot)
    }
}

impl Drop for TransportBinding {
    fn drop(&mut self) {
        self.slot.lock().bound = false;
        tracing::debug!("transport binding released");
    }
}

impl std::fmt::Debug for TransportBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBinding").finish_non_exhaustive()
    }
}

/// Hands out one [`SharedTransport`] per session code.
///
/// ```
/// use coop_sync::{MemoryTransport, TransportRegistry};
///
/// let mut registry = TransportRegistry::new();
/// let first = registry.obtain("ABC", MemoryTransport::new);
/// let second = registry.obtain("ABC", MemoryTransport::new);
/// assert!(first.same_transport(&second));
///
/// let binding = first.try_bind();
/// assert!(binding.is_some());
/// assert!(second.try_bind().is_none());
///
/// drop(binding);
/// assert!(second.try_bind().is_some());
/// ```
#[derive(Debug, Default)]
pub struct TransportRegistry {
    transports: BTreeMap<String, SharedTransport>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transport for `session_code`, creating it with `factory` on first use.
    pub fn obtain<F, T>(&mut self, session_code: &str, factory: F) -> SharedTransport
    where
        F: FnOnce() -> T,
        T: Transport + 'static,
    {
        self.transports
            .entry(session_code.to_owned())
            .or_insert_with(|| {
                tracing::debug!(session_code, "creating transport");
                SharedTransport::new(factory())
            })
            .clone()
    }

    /// Returns the transport for `session_code` if one exists.
    #[must_use]
    pub fn get(&self, session_code: &str) -> Option<SharedTransport> {
        self.transports.get(session_code).cloned()
    }

    /// Forgets the transport for `session_code` (e.g. on navigation away).
    ///
    /// A later [`obtain`](Self::obtain) creates a fresh, unbound transport.
    pub fn release(&mut self, session_code: &str) -> Option<SharedTransport> {
        self.transports.remove(session_code)
    }

    /// Number of registered transports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Whether no transports are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
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
    use crate::MemoryTransport;

    #[test]
    fn bind_succeeds_once_per_instance() {
        let shared = SharedTransport::new(MemoryTransport::new());
        let clone = shared.clone();
        assert!(!shared.is_bound());
        let binding = shared.try_bind().unwrap();
        assert!(binding.is_for(&clone));
        assert!(clone.is_bound());
        assert!(clone.try_bind().is_none());
    }

    #[test]
    fn dropping_the_binding_releases_the_transport() {
        let shared = SharedTransport::new(MemoryTransport::new());
        let binding = shared.try_bind().unwrap();
        drop(binding);
        assert!(!shared.is_bound());
        let again = shared.try_bind();
        assert!(again.is_some());
        assert!(shared.is_bound());
    }

    #[test]
    fn factory_runs_once_per_code() {
        let mut registry = TransportRegistry::new();
        let mut calls = 0;
        let _ = registry.obtain("A", || {
            calls += 1;
            MemoryTransport::new()
        });
        let _ = registry.obtain("A", || {
            calls += 1;
            MemoryTransport::new()
        });
        assert_eq!(calls, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_codes_get_distinct_transports() {
        let mut registry = TransportRegistry::new();
        let a = registry.obtain("A", MemoryTransport::new);
        let b = registry.obtain("B", MemoryTransport::new);
        assert!(!a.same_transport(&b));
    }

    #[test]
    fn release_yields_fresh_unbound_transport() {
        let mut registry = TransportRegistry::new();
        let first = registry.obtain("A", MemoryTransport::new);
        let _first_binding = first.try_bind().unwrap();
        assert!(registry.release("A").is_some());
        let second = registry.obtain("A", MemoryTransport::new);
        assert!(!second.same_transport(&first));
        assert!(second.try_bind().is_some());
        assert!(registry.get("B").is_none());
    }
}
