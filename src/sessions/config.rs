//! Configuration types for coop-sync clients.
//!
//! This module contains configuration structs that control submission timing, the
//! local health heuristic and the size of the display feed.
//!
//! # Overview
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `SubmissionConfig` | Submission timeout and affordance refresh | `responsive()`, `patient()` |
//! | `HealthConfig` | Optimistic health adjustment bounds | `authoritative_only()` |
//! | `FeedConfig` | Display feed capacity | `compact()`, `archival()` |
//!
//! # Example
//!
//! ```
//! use coop_sync::{ClientBuilder, FeedConfig, SessionContext, SubmissionConfig};
//!
//! let builder = ClientBuilder::new(SessionContext::new("ABC123", false, "u1"))
//!     .with_submission_config(SubmissionConfig::patient())
//!     .with_feed_config(FeedConfig::compact());
//! ```

use web_time::Duration;

use crate::{InvalidRequestKind, SessionError};

fn check_duration(
    field: &'static str,
    value: Duration,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), SessionError> {
    let actual_ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    if actual_ms < min_ms || actual_ms > max_ms {
        return Err(InvalidRequestKind::DurationConfigOutOfRange {
            field,
            min_ms,
            max_ms,
            actual_ms,
        }
        .into());
    }
    Ok(())
}

fn check_range(field: &'static str, actual: u64, min: u64, max: u64) -> Result<(), SessionError> {
    if actual < min || actual > max {
        return Err(InvalidRequestKind::ConfigValueOutOfRange {
            field,
            min,
            max,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Timing of the submission path.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Always use the
/// `..SubmissionConfig::default()` pattern when constructing instances.
///
/// # Example
///
/// ```
/// use coop_sync::SubmissionConfig;
/// use web_time::Duration;
///
/// let slow_server = SubmissionConfig {
///     timeout: Duration::from_secs(8),
///     ..SubmissionConfig::default()
/// };
/// assert!(slow_server.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "SubmissionConfig has no effect unless passed to ClientBuilder::with_submission_config()"]
pub struct SubmissionConfig {
    /// How long a submission may stay pending before it is failed locally and
    /// submission capability is restored.
    ///
    /// Default: 4000ms
    pub timeout: Duration,

    /// Interval of the cooldown-derived affordance refresh run by `poll()`.
    ///
    /// Default: 600ms
    pub affordance_interval: Duration,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(4000),
            affordance_interval: Duration::from_millis(600),
        }
    }
}

impl SubmissionConfig {
    /// Creates a new `SubmissionConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorter timeout and a faster refresh, for local servers.
    pub fn responsive() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            affordance_interval: Duration::from_millis(250),
        }
    }

    /// Longer timeout for slow or heavily loaded servers.
    pub fn patient() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            affordance_interval: Duration::from_millis(1000),
        }
    }

    /// Validates the submission configuration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRequest` if any value is out of range.
    pub fn validate(&self) -> Result<(), SessionError> {
        check_duration("timeout", self.timeout, 1, 60_000)?;
        check_duration("affordance_interval", self.affordance_interval, 50, 10_000)?;
        Ok(())
    }
}

/// Bounds of the optimistic health heuristic.
///
/// When an action resolves without an authoritative health value for its actor, a
/// correct action heals the actor by `min(heal_cap, |score|)` (or `heal_default` for a
/// zero score) and an incorrect one damages the actor by `min(damage_cap, |score|)` (or
/// `damage_default`). The result is clamped to `0..=max_health`.
///
/// # Example
///
/// ```
/// use coop_sync::HealthConfig;
///
/// let config = HealthConfig::default();
/// assert_eq!(config.heal_amount(5), 5);
/// assert_eq!(config.heal_amount(40), 6);
/// assert_eq!(config.damage_amount(0), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "HealthConfig has no effect unless passed to ClientBuilder::with_health_config()"]
pub struct HealthConfig {
    /// Health of a participant on first appearance, and the upper clamp.
    ///
    /// Default: 100
    pub max_health: i64,

    /// Largest heal applied for a correct action.
    ///
    /// Default: 6
    pub heal_cap: i64,

    /// Heal applied for a correct action that carries a zero score.
    ///
    /// Default: 3
    pub heal_default: i64,

    /// Largest damage applied for an incorrect action.
    ///
    /// Default: 12
    pub damage_cap: i64,

    /// Damage applied for an incorrect action that carries a zero score.
    ///
    /// Default: 10
    pub damage_default: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_health: 100,
            heal_cap: 6,
            heal_default: 3,
            damage_cap: 12,
            damage_default: 10,
        }
    }
}

impl HealthConfig {
    /// Creates a new `HealthConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables the heuristic: health only changes through authoritative maps.
    pub fn authoritative_only() -> Self {
        Self {
            heal_cap: 0,
            heal_default: 0,
            damage_cap: 0,
            damage_default: 0,
            ..Self::default()
        }
    }

    /// Heal for a correct action with the given score delta.
    #[must_use]
    pub fn heal_amount(&self, score: i64) -> i64 {
        if score == 0 {
            self.heal_default
        } else {
            self.heal_cap.min(score.saturating_abs())
        }
    }

    /// Damage for an incorrect action with the given score delta.
    #[must_use]
    pub fn damage_amount(&self, score: i64) -> i64 {
        if score == 0 {
            self.damage_default
        } else {
            self.damage_cap.min(score.saturating_abs())
        }
    }

    /// Clamps a health value into `0..=max_health`.
    #[must_use]
    pub fn clamp(&self, health: i64) -> i64 {
        health.clamp(0, self.max_health)
    }

    /// Validates the health configuration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRequest` if any value is out of range.
    pub fn validate(&self) -> Result<(), SessionError> {
        let as_u64 = |v: i64| u64::try_from(v).unwrap_or(0);
        if self.max_health < 1 || self.max_health > 1000 {
            return Err(InvalidRequestKind::ConfigValueOutOfRange {
                field: "max_health",
                min: 1,
                max: 1000,
                actual: as_u64(self.max_health),
            }
            .into());
        }
        let max = as_u64(self.max_health);
        for (field, value) in [
            ("heal_cap", self.heal_cap),
            ("heal_default", self.heal_default),
            ("damage_cap", self.damage_cap),
            ("damage_default", self.damage_default),
        ] {
            // negative values are reported as 0, which is in range, so test them first
            if value < 0 {
                return Err(InvalidRequestKind::ConfigValueOutOfRange {
                    field,
                    min: 0,
                    max,
                    actual: 0,
                }
                .into());
            }
            check_range(field, as_u64(value), 0, max)?;
        }
        Ok(())
    }
}

/// Sizing of the in-memory display feed.
///
/// The feed is append-only; once `capacity` is reached the oldest entry is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "FeedConfig has no effect unless passed to ClientBuilder::with_feed_config()"]
pub struct FeedConfig {
    /// Maximum number of retained feed entries.
    ///
    /// Default: 500
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

impl FeedConfig {
    /// Creates a new `FeedConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A short feed for small displays.
    pub fn compact() -> Self {
        Self { capacity: 50 }
    }

    /// A long feed, e.g. for post-session review.
    pub fn archival() -> Self {
        Self { capacity: 10_000 }
    }

    /// Validates the feed configuration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRequest` if `capacity` is outside `1..=100000`.
    pub fn validate(&self) -> Result<(), SessionError> {
        check_range("capacity", self.capacity as u64, 1, 100_000)
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

    // ========================================================================
    // SubmissionConfig Tests
    // ========================================================================

    #[test]
    fn test_submission_config_defaults() {
        let config = SubmissionConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(4000));
        assert_eq!(config.affordance_interval, Duration::from_millis(600));
        assert_eq!(config, SubmissionConfig::new());
    }

    #[test]
    fn test_submission_config_presets_validate() {
        for config in [
            SubmissionConfig::default(),
            SubmissionConfig::responsive(),
            SubmissionConfig::patient(),
        ] {
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_submission_config_zero_timeout_rejected() {
        let config = SubmissionConfig {
            timeout: Duration::ZERO,
            ..SubmissionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidRequest {
                kind: InvalidRequestKind::DurationConfigOutOfRange {
                    field: "timeout",
                    min_ms: 1,
                    max_ms: 60_000,
                    actual_ms: 0,
                }
            }
        );
    }

    #[test]
    fn test_submission_config_interval_upper_bound() {
        let config = SubmissionConfig {
            affordance_interval: Duration::from_millis(10_001),
            ..SubmissionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    // ========================================================================
    // HealthConfig Tests
    // ========================================================================

    #[test]
    fn test_health_config_amounts() {
        let config = HealthConfig::default();
        assert_eq!(config.heal_amount(0), 3);
        assert_eq!(config.heal_amount(-4), 4);
        assert_eq!(config.heal_amount(100), 6);
        assert_eq!(config.damage_amount(8), 8);
        assert_eq!(config.damage_amount(-30), 12);
        assert_eq!(config.damage_amount(i64::MIN), 12);
    }

    #[test]
    fn test_health_config_clamp() {
        let config = HealthConfig::default();
        assert_eq!(config.clamp(105), 100);
        assert_eq!(config.clamp(-3), 0);
        assert_eq!(config.clamp(42), 42);
    }

    #[test]
    fn test_health_config_authoritative_only() {
        let config = HealthConfig::authoritative_only();
        config.validate().unwrap();
        assert_eq!(config.heal_amount(5), 0);
        assert_eq!(config.damage_amount(5), 0);
    }

    #[test]
    fn test_health_config_negative_cap_rejected() {
        let config = HealthConfig {
            damage_cap: -1,
            ..HealthConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("damage_cap"));
    }

    #[test]
    fn test_health_config_cap_above_max_rejected() {
        let config = HealthConfig {
            max_health: 10,
            ..HealthConfig::default()
        };
        // damage_cap of 12 no longer fits
        assert!(config.validate().is_err());
    }

    // ========================================================================
    // FeedConfig Tests
    // ========================================================================

    #[test]
    fn test_feed_config_presets() {
        assert_eq!(FeedConfig::default().capacity, 500);
        FeedConfig::compact().validate().unwrap();
        FeedConfig::archival().validate().unwrap();
    }

    #[test]
    fn test_feed_config_zero_capacity_rejected() {
        assert!(FeedConfig { capacity: 0 }.validate().is_err());
    }
}
