//! Configuration for the expiration controller
//!
//! The host's preference store populates this struct at startup and pushes
//! a fresh copy through `ExpirationService::reload_config` whenever a
//! setting changes. Validation happens centrally in [`ExpirationConfig::validated`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default seconds between timed expiration steps.
pub const DEFAULT_INTERVAL_SECONDS: i64 = 180;

/// Default retention window for interaction artifacts, in days.
pub const DEFAULT_INTERACTION_RETENTION_DAYS: u32 = 60;

/// Typed settings driving the expiration controller.
///
/// # Examples
///
/// ```
/// use trove_expiration::ExpirationConfig;
///
/// let config = ExpirationConfig::default();
/// assert_eq!(config.max_records, -1);
/// assert_eq!(config.interval_seconds, 180);
///
/// // Non-positive intervals are coerced back to the default.
/// let config = ExpirationConfig { interval_seconds: 0, ..Default::default() }.validated();
/// assert_eq!(config.interval_seconds, 180);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirationConfig {
    /// Maximum number of records to retain. `-1` derives a limit from the
    /// store size budget. This is a lazy limit: expiration starts once the
    /// count exceeds it and stops after the step that brings it back
    /// below, not exactly at the boundary.
    pub max_records: i64,

    /// Seconds between timed expiration steps. Values of zero or below are
    /// coerced to the default.
    pub interval_seconds: i64,

    /// Retention window for interaction artifacts, in days.
    pub interaction_retention_days: u32,

    /// Whether the interaction-cleanup catalog entry runs at all.
    #[serde(default)]
    pub interactions_enabled: bool,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            max_records: -1,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            interaction_retention_days: DEFAULT_INTERACTION_RETENTION_DAYS,
            interactions_enabled: false,
        }
    }
}

impl ExpirationConfig {
    /// Coerce out-of-range values back to their defaults. Invalid settings
    /// degrade rather than fail.
    pub fn validated(mut self) -> Self {
        if self.interval_seconds <= 0 {
            self.interval_seconds = DEFAULT_INTERVAL_SECONDS;
        }
        self
    }

    /// The timed-step interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1) as u64)
    }
}
