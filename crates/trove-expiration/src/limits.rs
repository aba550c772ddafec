//! Batch-limit policy: converts size classes into concrete per-step row
//! limits and estimates how many records the store should retain.

use crate::ExpirationConfig;
use tracing::warn;
use trove_domain::traits::{StoreExecutor, StoreStats};
use trove_domain::{Action, SizeClass, Status};

/// Max number of entries to expire at each expiration step. Tweaked per
/// data type by the catalog.
pub const EXPIRE_LIMIT_PER_STEP: i64 = 6;

/// A large expiration step multiplies the per-step limit by this.
pub const EXPIRE_LIMIT_LARGE_STEP_MULTIPLIER: i64 = 10;

/// When the store is dirty, step frequency and batch sizes scale by this.
pub const EXPIRE_AGGRESSIVITY_MULTIPLIER: i64 = 3;

/// Target size of the store file. Hardware above this has plenty of room,
/// but query performance does not grow linearly with size.
pub const TARGET_STORE_BYTES: u64 = 78_643_200; // 75 MiB

/// Nominal average size in bytes of one record entry, used as a fallback
/// when the measured average is implausible.
pub const ENTRY_AVG_SIZE_BYTES: u64 = 700;

/// Capacity used when store statistics are unavailable (e.g. mid-shutdown).
pub const FALLBACK_CAPACITY: u64 = 100_000;

/// If the record count exceeds capacity by more than this, timed
/// expiration switches to large steps.
pub const OVERLIMIT_RECORDS_THRESHOLD: u64 = 1_000;

/// Concrete per-step row limit for one run.
///
/// `-1` means no cap (SQLite treats a negative LIMIT as unlimited).
pub fn step_limit(
    size_class: SizeClass,
    status: Status,
    action: Action,
    debug_override: i64,
) -> i64 {
    let mut base = match size_class {
        SizeClass::Small => EXPIRE_LIMIT_PER_STEP,
        SizeClass::Large => EXPIRE_LIMIT_PER_STEP * EXPIRE_LIMIT_LARGE_STEP_MULTIPLIER,
        SizeClass::Unlimited => -1,
        SizeClass::Debug => debug_override,
    };
    // Dirty stores must shrink faster per step; debug runs stay under
    // operator control.
    if status == Status::Dirty && !action.intersects(Action::DEBUG) && base > 0 {
        base *= EXPIRE_AGGRESSIVITY_MULTIPLIER;
    }
    base
}

/// Retention-capacity estimator with a one-value cache.
///
/// The cache is invalidated whenever the `max_records` override changes.
#[derive(Debug, Default)]
pub struct LimitPolicy {
    cached_capacity: Option<u64>,
}

impl LimitPolicy {
    /// A policy with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached capacity; the next query recomputes it.
    pub fn invalidate(&mut self) {
        self.cached_capacity = None;
    }

    /// Maximum number of records the store should retain.
    ///
    /// An explicit non-negative `max_records` wins; otherwise the limit is
    /// estimated so the store stays near [`TARGET_STORE_BYTES`]. Statistics
    /// failures fall back to [`FALLBACK_CAPACITY`] and never propagate.
    pub fn capacity_limit<S: StoreExecutor>(
        &mut self,
        config: &ExpirationConfig,
        store: &S,
    ) -> u64 {
        if let Some(capacity) = self.cached_capacity {
            return capacity;
        }
        let capacity = if config.max_records >= 0 {
            config.max_records as u64
        } else {
            match store.stats() {
                Ok(stats) => Self::estimate(stats),
                Err(err) => {
                    // Possibly initialized late in shutdown; a large
                    // default is not critical at that point.
                    warn!("store statistics unavailable, using fallback capacity: {err}");
                    FALLBACK_CAPACITY
                }
            }
        };
        self.cached_capacity = Some(capacity);
        capacity
    }

    fn estimate(stats: StoreStats) -> u64 {
        let used = stats.allocated_bytes.saturating_sub(stats.free_bytes);
        let mut avg_entry_size = if stats.record_count == 0 {
            // Freshly created store; only the file header is allocated.
            ENTRY_AVG_SIZE_BYTES
        } else {
            used.div_ceil(stats.record_count)
        };
        // For new stores the measured average is dominated by fixed
        // overhead; an implausible value falls back to the nominal one.
        if avg_entry_size > ENTRY_AVG_SIZE_BYTES * 3 {
            avg_entry_size = ENTRY_AVG_SIZE_BYTES;
        }
        if avg_entry_size == 0 {
            avg_entry_size = ENTRY_AVG_SIZE_BYTES;
        }
        TARGET_STORE_BYTES.div_ceil(avg_entry_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_domain::traits::BatchOp;
    use trove_domain::RemovalSignal;

    struct StatsStore(Result<StoreStats, String>);

    impl StoreExecutor for StatsStore {
        type Error = String;

        fn prepare_expiration(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn execute_expiration(
            &mut self,
            _ops: &[BatchOp],
        ) -> Result<Vec<RemovalSignal>, Self::Error> {
            Ok(Vec::new())
        }

        fn stats(&self) -> Result<StoreStats, Self::Error> {
            self.0.clone()
        }

        fn record_count(&self) -> Result<u64, Self::Error> {
            Ok(self.0.clone().map(|s| s.record_count).unwrap_or(0))
        }
    }

    fn stats(record_count: u64, allocated_bytes: u64, free_bytes: u64) -> StoreStats {
        StoreStats {
            record_count,
            allocated_bytes,
            free_bytes,
        }
    }

    #[test]
    fn test_explicit_override_wins() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig {
            max_records: 500,
            ..Default::default()
        };
        let store = StatsStore(Ok(stats(1_000, 100_000_000, 0)));
        assert_eq!(policy.capacity_limit(&config, &store), 500);
    }

    #[test]
    fn test_estimation_from_stats() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig::default();
        // avg entry size = ceil(1_000_000 / 1_000) = 1000 bytes, within the
        // plausible range, so no clamping.
        let store = StatsStore(Ok(stats(1_000, 1_000_000, 0)));
        let expected = TARGET_STORE_BYTES.div_ceil(1_000);
        assert_eq!(policy.capacity_limit(&config, &store), expected);
    }

    #[test]
    fn test_estimation_subtracts_free_bytes() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig::default();
        // used = 2_000_000 - 1_000_000, avg = 1000
        let store = StatsStore(Ok(stats(1_000, 2_000_000, 1_000_000)));
        let expected = TARGET_STORE_BYTES.div_ceil(1_000);
        assert_eq!(policy.capacity_limit(&config, &store), expected);
    }

    #[test]
    fn test_implausible_average_clamped_to_nominal() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig::default();
        // One record in a store dominated by header overhead.
        let store = StatsStore(Ok(stats(1, 1_000_000, 0)));
        let expected = TARGET_STORE_BYTES.div_ceil(ENTRY_AVG_SIZE_BYTES);
        assert_eq!(policy.capacity_limit(&config, &store), expected);
    }

    #[test]
    fn test_empty_store_uses_nominal_average() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig::default();
        let store = StatsStore(Ok(stats(0, 4_096, 0)));
        let expected = TARGET_STORE_BYTES.div_ceil(ENTRY_AVG_SIZE_BYTES);
        assert_eq!(policy.capacity_limit(&config, &store), expected);
    }

    #[test]
    fn test_stats_failure_falls_back() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig::default();
        let store = StatsStore(Err("closed".to_string()));
        assert_eq!(policy.capacity_limit(&config, &store), FALLBACK_CAPACITY);
    }

    #[test]
    fn test_cache_and_invalidation() {
        let mut policy = LimitPolicy::new();
        let config = ExpirationConfig {
            max_records: 500,
            ..Default::default()
        };
        let store = StatsStore(Ok(stats(1_000, 1_000_000, 0)));
        assert_eq!(policy.capacity_limit(&config, &store), 500);

        // Cached value survives a config change until invalidated.
        let config = ExpirationConfig {
            max_records: 900,
            ..Default::default()
        };
        assert_eq!(policy.capacity_limit(&config, &store), 500);
        policy.invalidate();
        assert_eq!(policy.capacity_limit(&config, &store), 900);
    }

    #[test]
    fn test_step_limit_table() {
        let timed = Action::TIMED;
        assert_eq!(step_limit(SizeClass::Small, Status::Clean, timed, 0), 6);
        assert_eq!(step_limit(SizeClass::Large, Status::Clean, timed, 0), 60);
        assert_eq!(step_limit(SizeClass::Unlimited, Status::Clean, timed, 0), -1);
        assert_eq!(step_limit(SizeClass::Debug, Status::Clean, Action::DEBUG, 5), 5);
    }

    #[test]
    fn test_step_limit_dirty_multiplier() {
        let timed = Action::TIMED;
        assert_eq!(step_limit(SizeClass::Small, Status::Dirty, timed, 0), 18);
        assert_eq!(step_limit(SizeClass::Large, Status::Dirty, timed, 0), 180);
        // Unlimited stays unlimited, debug stays under operator control.
        assert_eq!(step_limit(SizeClass::Unlimited, Status::Dirty, timed, 0), -1);
        assert_eq!(step_limit(SizeClass::Debug, Status::Dirty, Action::DEBUG, 5), 5);
        // Unknown status gets no multiplier.
        assert_eq!(step_limit(SizeClass::Small, Status::Unknown, timed, 0), 6);
    }
}
