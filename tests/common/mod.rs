//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `harness`: a [`TestClient`](harness::TestClient) wiring a client to an in-memory
//!   transport, a recording bridge, a manual clock and a collecting observer
//! - `fixtures`: JSON payload builders for the server events
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! mod common;
//! use common::harness::TestClient;
//! use common::fixtures::{action_result, record};
//! ```

pub mod fixtures;
pub mod harness;

// Re-export commonly used items for convenience.
// These are public utilities for integration tests - allow unused until tests adopt them.
#[allow(unused_imports)]
pub use fixtures::{action_result, participants, record, RecordSpec};
#[allow(unused_imports)]
pub use harness::{TestClient, EPOCH_SECS, LOCAL_ID, SESSION_CODE};
