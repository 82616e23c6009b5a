use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::network::registry::SharedTransport;
use crate::render::{RenderBridge, TracingBridge};
use crate::sessions::client::SessionClient;
use crate::sessions::config::{FeedConfig, HealthConfig, SubmissionConfig};
use crate::telemetry::ViolationObserver;
use crate::{InvalidRequestKind, SessionContext, SessionError};

/// Default event queue size.
/// Events older than this threshold may be dropped if not polled.
const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;
const MIN_EVENT_QUEUE_SIZE: usize = 10;
const MAX_EVENT_QUEUE_SIZE: usize = 10_000;

/// The [`ClientBuilder`] builds a [`SessionClient`].
///
/// After setting all appropriate values, use [`ClientBuilder::build`] to consume the
/// builder and bind the client to its transport.
///
/// # Example
///
/// ```
/// use coop_sync::prelude::*;
/// use coop_sync::telemetry::CollectingObserver;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), SessionError> {
/// let mut registry = TransportRegistry::new();
/// let transport = registry.obtain("ABC123", MemoryTransport::new);
/// let observer = Arc::new(CollectingObserver::new());
///
/// let client = ClientBuilder::new(SessionContext::new("ABC123", false, "u1"))
///     .with_violation_observer(observer.clone())
///     .with_event_queue_size(200)?
///     .build(&transport)?;
/// assert_eq!(client.router_state(), RouterState::Bound);
/// # Ok(())
/// # }
/// ```
#[must_use = "ClientBuilder must be consumed by calling build()"]
pub struct ClientBuilder {
    context: SessionContext,
    /// Where render commands go. Defaults to [`TracingBridge`].
    render_bridge: Option<Arc<dyn RenderBridge>>,
    /// Time source. Defaults to [`SystemClock`].
    clock: Option<Arc<dyn Clock>>,
    /// Optional observer for contract violations.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    submission_config: SubmissionConfig,
    health_config: HealthConfig,
    feed_config: FeedConfig,
    /// Maximum number of events to queue before oldest are dropped.
    event_queue_size: usize,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            context,
            render_bridge,
            clock,
            violation_observer,
            submission_config,
            health_config,
            feed_config,
            event_queue_size,
        } = self;

        f.debug_struct("ClientBuilder")
            .field("context", context)
            .field("has_render_bridge", &render_bridge.is_some())
            .field("has_clock", &clock.is_some())
            .field("has_violation_observer", &violation_observer.is_some())
            .field("submission_config", submission_config)
            .field("health_config", health_config)
            .field("feed_config", feed_config)
            .field("event_queue_size", event_queue_size)
            .finish()
    }
}

impl ClientBuilder {
    /// Starts a builder for the session described by `context`.
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            render_bridge: None,
            clock: None,
            violation_observer: None,
            submission_config: SubmissionConfig::default(),
            health_config: HealthConfig::default(),
            feed_config: FeedConfig::default(),
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
        }
    }

    /// Sets the bridge that receives render commands.
    pub fn with_render_bridge(mut self, bridge: Arc<dyn RenderBridge>) -> Self {
        self.render_bridge = Some(bridge);
        self
    }

    /// Sets the time source. Tests pass a [`ManualClock`](crate::ManualClock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets a custom observer for contract violations.
    ///
    /// When a violation occurs during client operation (an undecodable payload, a late
    /// resolution, a duplicate bind, an unannounced participant), it is reported to this
    /// observer. If no observer is set, violations are logged via the `tracing` crate.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Sets the submission timing. Validated in [`build`](Self::build).
    pub fn with_submission_config(mut self, config: SubmissionConfig) -> Self {
        self.submission_config = config;
        self
    }

    /// Sets the health heuristic bounds. Validated in [`build`](Self::build).
    pub fn with_health_config(mut self, config: HealthConfig) -> Self {
        self.health_config = config;
        self
    }

    /// Sets the feed capacity. Validated in [`build`](Self::build).
    pub fn with_feed_config(mut self, config: FeedConfig) -> Self {
        self.feed_config = config;
        self
    }

    /// Sets the maximum number of queued host events. Default is 100.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `size` is outside `10..=10000`
    ///
    /// [`InvalidRequest`]: SessionError::InvalidRequest
    pub fn with_event_queue_size(mut self, size: usize) -> Result<Self, SessionError> {
        if !(MIN_EVENT_QUEUE_SIZE..=MAX_EVENT_QUEUE_SIZE).contains(&size) {
            return Err(InvalidRequestKind::ConfigValueOutOfRange {
                field: "event_queue_size",
                min: MIN_EVENT_QUEUE_SIZE as u64,
                max: MAX_EVENT_QUEUE_SIZE as u64,
                actual: size as u64,
            }
            .into());
        }
        self.event_queue_size = size;
        Ok(self)
    }

    /// Consumes the builder and binds a [`SessionClient`] to `transport`.
    ///
    /// If another client already bound the same transport, the new client is returned
    /// [`Unbound`](crate::RouterState::Unbound): it never drains the transport and
    /// refuses to submit.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if any config is out of range.
    ///
    /// [`InvalidRequest`]: SessionError::InvalidRequest
    pub fn build(self, transport: &SharedTransport) -> Result<SessionClient, SessionError> {
        self.submission_config.validate()?;
        self.health_config.validate()?;
        self.feed_config.validate()?;

        Ok(SessionClient::new(
            self.context,
            transport.clone(),
            self.render_bridge
                .unwrap_or_else(|| Arc::new(TracingBridge)),
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.violation_observer,
            self.submission_config,
            self.health_config,
            self.feed_config,
            self.event_queue_size,
        ))
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
    use crate::{MemoryTransport, RouterState};
    use web_time::Duration;

    fn context() -> SessionContext {
        SessionContext::new("S", true, "u1")
    }

    #[test]
    fn test_event_queue_size_bounds() {
        assert!(ClientBuilder::new(context()).with_event_queue_size(9).is_err());
        assert!(ClientBuilder::new(context()).with_event_queue_size(10).is_ok());
        assert!(ClientBuilder::new(context())
            .with_event_queue_size(10_001)
            .is_err());
    }

    #[test]
    fn test_build_validates_configs() {
        let transport = SharedTransport::new(MemoryTransport::new());
        let err = ClientBuilder::new(context())
            .with_submission_config(SubmissionConfig {
                timeout: Duration::ZERO,
                ..SubmissionConfig::default()
            })
            .build(&transport)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidRequest { .. }));
        // a failed build must not consume the binding
        assert!(!transport.is_bound());
    }

    #[test]
    fn test_second_build_is_unbound() {
        let transport = SharedTransport::new(MemoryTransport::new());
        let first = ClientBuilder::new(context()).build(&transport).unwrap();
        let second = ClientBuilder::new(context()).build(&transport).unwrap();
        assert_eq!(first.router_state(), RouterState::Bound);
        assert_eq!(second.router_state(), RouterState::Unbound);
    }

    #[test]
    fn test_debug_lists_fields() {
        let debug = format!("{:?}", ClientBuilder::new(context()));
        assert!(debug.contains("event_queue_size: 100"));
        assert!(debug.contains("has_render_bridge: false"));
    }
}
