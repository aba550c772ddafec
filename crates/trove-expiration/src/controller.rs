//! The run controller: executes one expiration step end to end.
//!
//! A step selects the catalog entries matching the trigger, resolves their
//! parameters, executes them in one store transaction, aggregates the
//! staged rows into notifications, and feeds the yield back into the
//! clean/dirty status.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info};
use trove_domain::traits::{BatchOp, MetricsSink, RemovalObserver, StoreExecutor};
use trove_domain::{Action, RemovalEvent, SizeClass, Status};

use crate::catalog::{catalog, Param, Toggle};
use crate::limits::{step_limit, LimitPolicy, EXPIRE_AGGRESSIVITY_MULTIPLIER};
use crate::metrics::NullMetrics;
use crate::status::StatusTracker;
use crate::{ExpirationConfig, ExpirationError};

/// What one expiration step did.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// The step was refused (service already shutting down).
    pub skipped: bool,

    /// Deduplicated removal events produced by the step.
    pub events: Vec<RemovalEvent>,

    /// Whether the step flipped the clean/dirty status.
    pub status_changed: bool,
}

impl RunOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Effect of swapping in a new configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDelta {
    /// The timed-step interval changed; the scheduler should renew its
    /// timer.
    pub interval_changed: bool,

    /// The retention capacity override changed; the cached estimate was
    /// invalidated.
    pub max_records_changed: bool,
}

/// Drives expiration steps over a [`StoreExecutor`].
///
/// Owns the store handle, so all steps are naturally serialized; the
/// scheduler task is the single caller in production.
pub struct Expiration<S: StoreExecutor> {
    store: S,
    config: ExpirationConfig,
    status: StatusTracker,
    limits: LimitPolicy,
    shutting_down: bool,
    expire_on_idle: bool,
    debug_override: Option<i64>,
    telemetry_steps: u32,
    observers: Vec<Arc<dyn RemovalObserver>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<S: StoreExecutor> Expiration<S> {
    /// A controller over `store` with the given configuration.
    pub fn new(store: S, config: ExpirationConfig) -> Self {
        Self {
            store,
            config: config.validated(),
            status: StatusTracker::new(),
            limits: LimitPolicy::new(),
            shutting_down: false,
            expire_on_idle: false,
            debug_override: None,
            telemetry_steps: 1,
            observers: Vec::new(),
            metrics: Arc::new(NullMetrics),
        }
    }

    /// Register a removal observer.
    pub fn add_observer(&mut self, observer: Arc<dyn RemovalObserver>) {
        self.observers.push(observer);
    }

    /// Replace the metrics sink.
    pub fn set_metrics(&mut self, metrics: Arc<dyn MetricsSink>) {
        self.metrics = metrics;
    }

    /// Create the run-scoped staging state. Must succeed before any step
    /// runs; a failure leaves the controller unusable.
    pub fn setup(&mut self) -> Result<(), ExpirationError> {
        self.store
            .prepare_expiration()
            .map_err(|err| ExpirationError::Setup(err.to_string()))
    }

    /// Current clean/dirty status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// The active configuration.
    pub fn config(&self) -> &ExpirationConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the controller and hand the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Whether idle periods should trigger cleanup steps.
    pub fn expire_on_idle(&self) -> bool {
        self.expire_on_idle
    }

    /// Toggle idle cleanup. Forced off while a debug override is active,
    /// so debug sessions observe only their own steps.
    pub fn set_expire_on_idle(&mut self, value: bool) {
        self.expire_on_idle = value && self.debug_override.is_none();
    }

    /// Refuse every step from now on, except the final dirty-shutdown one.
    pub fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        self.expire_on_idle = false;
    }

    /// Maximum number of records the store should retain.
    pub fn capacity_limit(&mut self) -> u64 {
        self.limits.capacity_limit(&self.config, &self.store)
    }

    /// Current record count. A counting failure logs and reports zero,
    /// which reads as "not over capacity".
    pub fn record_count(&mut self) -> u64 {
        match self.store.record_count() {
            Ok(count) => count,
            Err(err) => {
                error!("record count unavailable: {err}");
                0
            }
        }
    }

    /// Swap in a new configuration and report what changed.
    pub fn reload_config(&mut self, new: ExpirationConfig) -> ConfigDelta {
        let new = new.validated();
        let delta = ConfigDelta {
            interval_changed: new.interval_seconds != self.config.interval_seconds,
            max_records_changed: new.max_records != self.config.max_records,
        };
        if delta.max_records_changed {
            self.limits.invalidate();
        }
        self.config = new;
        delta
    }

    /// Run one operator-requested step with an explicit row limit.
    ///
    /// `-1` runs unbounded; any other non-positive value runs only the
    /// unconditional cleanup entries. A bounded debug step disables idle
    /// cleanup for the rest of the session so a controlled session only
    /// observes its own steps; an unbounded pass leaves it untouched.
    pub fn debug_expire(&mut self, limit: i64) -> Result<RunOutcome, ExpirationError> {
        let (size, debug_override) = if limit == -1 {
            (SizeClass::Unlimited, None)
        } else if limit > 0 {
            (SizeClass::Debug, Some(limit))
        } else {
            (SizeClass::Debug, Some(0))
        };
        if let Some(limit) = debug_override {
            self.debug_override = Some(limit);
            self.expire_on_idle = false;
        }
        self.expire(Action::DEBUG, size)
    }

    /// Run one expiration step.
    pub fn expire(
        &mut self,
        action: Action,
        size: SizeClass,
    ) -> Result<RunOutcome, ExpirationError> {
        if self.shutting_down && !action.intersects(Action::SHUTDOWN_DIRTY) {
            debug!(action = %action, "skipping expiration step during shutdown");
            return Ok(RunOutcome::skipped());
        }

        let old_status = self.status.get();
        let limit = step_limit(size, old_status, action, self.debug_override.unwrap_or(0));
        let now = now_ms();
        let ops = self.build_ops(action, limit, now);
        debug!(action = %action, limit, ops = ops.len(), "running expiration step");

        let signals = self.store.execute_expiration(&ops).map_err(|err| {
            error!(action = %action, "expiration step failed: {err}");
            ExpirationError::Store(err.to_string())
        })?;

        let mut aggregator = crate::aggregate::NotificationAggregator::new();
        for signal in &signals {
            aggregator.push(signal);
        }
        let outcome = aggregator.finish(now);

        if !outcome.events.is_empty() {
            info!(
                action = %action,
                removed = signals.len(),
                records = outcome.events.len(),
                "expiration step removed entries"
            );
            for observer in &self.observers {
                observer.on_removals(&outcome.events);
            }
        }
        if let Some(days) = outcome.most_recent_expired_age_days {
            self.metrics.most_recent_expired_age_days(days);
        }

        let mut status_changed = false;
        if let Some(new_status) = StatusTracker::derive(outcome.expected_remaining) {
            status_changed = self.status.set(new_status);
            if status_changed {
                info!(status = %new_status, "store status changed");
                self.set_expire_on_idle(new_status == Status::Dirty);
            }
            if new_status == Status::Dirty {
                self.telemetry_steps += 1;
            } else {
                if old_status == Status::Dirty {
                    self.metrics.steps_to_clean(self.telemetry_steps);
                }
                self.telemetry_steps = 1;
            }
        }

        for observer in &self.observers {
            observer.on_run_finished();
        }

        Ok(RunOutcome {
            skipped: false,
            events: outcome.events,
            status_changed,
        })
    }

    fn build_ops(&mut self, action: Action, limit: i64, now: i64) -> Vec<BatchOp> {
        let capacity = self.capacity_limit() as i64;
        let mut ops = Vec::new();
        for entry in catalog() {
            if !entry.actions.intersects(action) {
                continue;
            }
            if entry.disabled_by == Some(Toggle::Interactions) && !self.config.interactions_enabled
            {
                continue;
            }
            let params = entry
                .params
                .iter()
                .map(|&param| {
                    let value = if let Some(cutoff) = param.cutoff(&self.config, now) {
                        cutoff
                    } else {
                        match param {
                            Param::MaxRecords => capacity,
                            // One record may own several annotations; give
                            // their cleanup more room per step.
                            Param::LimitAnnotations if limit > 0 => {
                                limit * EXPIRE_AGGRESSIVITY_MULTIPLIER
                            }
                            _ => limit,
                        }
                    };
                    (param.placeholder(), value)
                })
                .collect();
            ops.push(BatchOp {
                name: entry.name,
                sql: entry.sql,
                params,
            });
        }
        ops
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
