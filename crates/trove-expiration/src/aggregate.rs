//! Aggregates raw removal signals into per-record notification events.
//!
//! One run stages many rows, often several visits of the same record. The
//! aggregator folds them into one [`RemovalEvent`] per url, and extracts
//! the two run-level facts the controller needs: the expected-results
//! countdown for dirtiness inference and the age of the most recently
//! expired visit for telemetry.

use std::collections::BTreeMap;

use trove_domain::{RemovalEvent, RemovalReason, RemovalSignal, MSECS_PER_DAY};

/// Per-url accumulation state.
#[derive(Debug, Default)]
struct Group {
    guid: String,
    visit_at: Option<i64>,
    whole_record: bool,
}

/// Everything a finished run reports to the controller.
#[derive(Debug, PartialEq)]
pub struct AggregateOutcome {
    /// One event per affected record, ordered by url.
    pub events: Vec<RemovalEvent>,

    /// Remaining expected results of the size-gated finder, when one ran
    /// and staged at least one row. Zero means the finder filled its
    /// limit and the store is likely still over capacity.
    pub expected_remaining: Option<i64>,

    /// Age in whole days of the most recently expired visit, when a dated
    /// visit expired by age or pressure in this run.
    pub most_recent_expired_age_days: Option<u32>,
}

/// Folds one run's removal signals.
#[derive(Debug, Default)]
pub struct NotificationAggregator {
    groups: BTreeMap<String, Group>,
    expected_remaining: Option<i64>,
    most_recent_expired_at: Option<i64>,
}

impl NotificationAggregator {
    /// An empty aggregator for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one staged row.
    pub fn push(&mut self, signal: &RemovalSignal) {
        // The first stamped row carries the finder's limit; every stamped
        // row found is one expected result satisfied.
        if signal.expected_results > 0 {
            let remaining = self.expected_remaining.get_or_insert(signal.expected_results);
            *remaining = (*remaining - 1).max(0);
        }

        if signal.reason == RemovalReason::Expired && signal.record_id.is_none() {
            if let Some(visit_at) = signal.visit_at {
                if self.most_recent_expired_at.is_none_or(|at| visit_at > at) {
                    self.most_recent_expired_at = Some(visit_at);
                }
            }
        }

        let group = self.groups.entry(signal.url.clone()).or_default();
        if group.guid.is_empty() {
            group.guid = signal.guid.clone();
        }
        if signal.record_id.is_some() {
            group.whole_record = true;
        }
        if let Some(visit_at) = signal.visit_at {
            if group.visit_at.is_none_or(|at| visit_at > at) {
                group.visit_at = Some(visit_at);
            }
        }
    }

    /// Finish the run and produce the outcome. `now_ms` anchors the age
    /// computation.
    pub fn finish(self, now_ms: i64) -> AggregateOutcome {
        let events = self
            .groups
            .into_iter()
            .map(|(url, group)| RemovalEvent {
                partial_removal: !group.whole_record && group.visit_at.unwrap_or(0) > 0,
                url,
                guid: group.guid,
                visit_at: group.visit_at,
                whole_record: group.whole_record,
            })
            .collect();

        let most_recent_expired_age_days = self
            .most_recent_expired_at
            .map(|at| ((now_ms - at).max(0) / MSECS_PER_DAY) as u32);

        AggregateOutcome {
            events,
            expected_remaining: self.expected_remaining,
            most_recent_expired_age_days,
        }
    }
}
