//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the expiration controller
//! and its collaborators. Infrastructure implementations live in other
//! crates (the SQLite executor in trove-store); event and metrics sinks
//! are supplied by the host.

use crate::{RemovalEvent, RemovalSignal};

/// One batched deletion operation, bound to named integer parameters.
///
/// The catalog produces these; the store executor runs a sequence of them
/// inside a single transaction.
#[derive(Debug, Clone)]
pub struct BatchOp {
    /// Stable operation name, used in logs and errors.
    pub name: &'static str,

    /// The statement to execute. Parameter placeholders use the `:name`
    /// form and must all appear in `params`.
    pub sql: &'static str,

    /// Named integer parameters, `(":name", value)` pairs.
    pub params: Vec<(&'static str, i64)>,
}

/// Size statistics of the underlying store, used to estimate retention
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of records currently retained.
    pub record_count: u64,

    /// Bytes allocated by the store file.
    pub allocated_bytes: u64,

    /// Bytes allocated but currently free (reusable without growth).
    pub free_bytes: u64,
}

/// Transactional batch executor over the record store.
///
/// Implemented by the infrastructure layer (trove-store). The executor
/// serializes writes; callers only sequence their own invocations.
pub trait StoreExecutor {
    /// Error type for store operations.
    type Error: std::fmt::Display;

    /// Create the run-scoped staging state (the `expiration_notify`
    /// temporary table). Called once during controller setup; every run
    /// relies on it.
    fn prepare_expiration(&mut self) -> Result<(), Self::Error>;

    /// Execute `ops` in declared order inside one transaction, then drain
    /// the staging table and return its rows. On any failure the whole
    /// transaction is rolled back and no rows are returned.
    fn execute_expiration(&mut self, ops: &[BatchOp])
        -> Result<Vec<RemovalSignal>, Self::Error>;

    /// Current size statistics.
    fn stats(&self) -> Result<StoreStats, Self::Error>;

    /// Number of records currently retained.
    fn record_count(&self) -> Result<u64, Self::Error>;
}

/// Receiver of aggregated removal events and run-completion signals.
pub trait RemovalObserver: Send + Sync {
    /// Called once per run with the deduplicated removal events, only when
    /// at least one event was produced.
    fn on_removals(&self, events: &[RemovalEvent]);

    /// Called at the end of every successful run, even an empty one.
    fn on_run_finished(&self) {}
}

/// Receiver of expiration telemetry counters.
pub trait MetricsSink: Send + Sync {
    /// Number of expiration steps it took to bring a dirty store back to
    /// clean; reported on the dirty-to-clean transition.
    fn steps_to_clean(&self, steps: u32);

    /// Age in whole days of the most recently expired visit, the minimum
    /// observed across one run.
    fn most_recent_expired_age_days(&self, days: u32);
}
