//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used types
//! from coop-sync, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use coop_sync::prelude::*;
//! ```
//!
//! # What's Included
//!
//! The prelude includes:
//!
//! - **Client types**: [`SessionClient`], [`ClientBuilder`], [`SessionContext`]
//! - **Transports**: [`Transport`], [`SharedTransport`], [`TransportRegistry`], [`MemoryTransport`]
//! - **Rendering**: [`RenderBridge`], [`RecordingBridge`], [`TracingBridge`], [`Cue`], [`SubmissionStatus`]
//! - **Fundamental types**: [`ActionKind`], [`ParticipantId`], [`Participant`]
//! - **Events**: [`SessionEvent`], [`RouterState`], [`FinalizeReason`], [`RankedEntry`]
//! - **Error handling**: [`SessionError`], [`InvalidRequestKind`]
//! - **Configuration**: [`SubmissionConfig`], [`HealthConfig`], [`FeedConfig`]
//! - **Time**: [`Clock`], [`SystemClock`], [`ManualClock`]
//!
//! # Example
//!
//! ```rust
//! use coop_sync::prelude::*;
//! use std::sync::Arc;
//!
//! struct LogBridge;
//!
//! impl RenderBridge for LogBridge {
//!     fn render_feed_entry(&self, actor: &str, message: &str) {
//!         tracing::info!(actor, message);
//!     }
//!     fn render_participants(&self, _participants: &[Participant]) {}
//!     fn update_participant_panels(
//!         &self,
//!         _participants: &[Participant],
//!         _health: &std::collections::BTreeMap<ParticipantId, i64>,
//!         _cooldowns: &coop_sync::CooldownMap,
//!     ) {
//!     }
//!     fn update_scoreboard(&self, _scores: &std::collections::BTreeMap<ParticipantId, i64>) {}
//!     fn play_outcome_effect(&self, _ok: bool, _actor: &ParticipantId, _targets: &[ParticipantId]) {}
//!     fn show_final_results(&self, _ranking: &[RankedEntry]) {}
//! }
//!
//! let transport = SharedTransport::new(MemoryTransport::new());
//! let client = ClientBuilder::new(SessionContext::new("ROOM", true, "7"))
//!     .with_render_bridge(Arc::new(LogBridge))
//!     .build(&transport);
//! assert!(client.is_ok());
//! ```

// Core client types
pub use crate::sessions::builder::ClientBuilder;
pub use crate::sessions::client::SessionClient;
pub use crate::SessionContext;

// Transports
pub use crate::{MemoryTransport, SharedTransport, Transport, TransportRegistry};

// Rendering
pub use crate::{Cue, RecordingBridge, RenderBridge, SubmissionStatus, TracingBridge};

// Fundamental types
pub use crate::{ActionKind, Participant, ParticipantId};

// Events and outcomes
pub use crate::{FinalizeReason, RankedEntry, RouterState, SessionEvent};

// Error handling
pub use crate::{InvalidRequestKind, SessionError};

// Configuration
pub use crate::{FeedConfig, HealthConfig, SubmissionConfig};

// Time
pub use crate::{Clock, ManualClock, SystemClock};
