//! Bundled [`MetricsSink`] implementations.
//!
//! Hosts with a real telemetry pipeline implement the trait themselves;
//! these cover the no-pipeline cases.

use tracing::info;
use trove_domain::traits::MetricsSink;

/// Discards every counter. The controller's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn steps_to_clean(&self, _steps: u32) {}

    fn most_recent_expired_age_days(&self, _days: u32) {}
}

/// Emits counters as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn steps_to_clean(&self, steps: u32) {
        info!(steps, "store reached clean status");
    }

    fn most_recent_expired_age_days(&self, days: u32) {
        info!(days, "age of most recently expired visit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sinks_accept_counters() {
        NullMetrics.steps_to_clean(3);
        NullMetrics.most_recent_expired_age_days(90);
        LogMetrics.steps_to_clean(3);
        LogMetrics.most_recent_expired_age_days(90);
    }
}
