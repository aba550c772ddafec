//! Clean/dirty status tracking with feedback-driven transitions

use trove_domain::Status;

/// Holds the process-wide store status.
///
/// Only the run controller mutates this, after a run's transaction has
/// fully committed; the scheduler reacts to reported changes by renewing
/// its timer and toggling expire-on-idle.
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: Status,
}

impl StatusTracker {
    /// A tracker starting at `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current status.
    pub fn get(&self) -> Status {
        self.current
    }

    /// Store a new status; returns whether the value changed.
    pub fn set(&mut self, new: Status) -> bool {
        if new == self.current {
            return false;
        }
        self.current = new;
        true
    }

    /// Derive the post-run status from the expected-results countdown.
    ///
    /// A countdown at exactly zero means every expected row was found and
    /// removed, so more are likely waiting: dirty. A positive remainder
    /// means the store yielded less than requested: clean. No countdown
    /// (no size-gated operation ran) leaves the status unchanged.
    pub fn derive(expected_remaining: Option<i64>) -> Option<Status> {
        match expected_remaining {
            Some(0) => Some(Status::Dirty),
            Some(_) => Some(Status::Clean),
            None => None,
        }
    }
}
