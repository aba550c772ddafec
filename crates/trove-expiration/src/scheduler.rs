//! The background expiration service.
//!
//! A single task owns the run controller and consumes a command channel,
//! so at most one expiration step is ever in flight. Host integration
//! points (idle notifications, preference reloads, shutdown) are cheap
//! channel sends through a cloneable [`ExpirationService`] handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};
use trove_domain::traits::{MetricsSink, RemovalObserver, StoreExecutor};
use trove_domain::{Action, SizeClass, Status};

use crate::controller::Expiration;
use crate::limits::{EXPIRE_AGGRESSIVITY_MULTIPLIER, OVERLIMIT_RECORDS_THRESHOLD};
use crate::{ExpirationConfig, ExpirationError};

/// A timed step waits this long for an idle slice before running anyway.
const MAX_TIMER_DEFER: Duration = Duration::from_secs(300);

const COMMAND_BUFFER: usize = 32;

enum Command {
    RunTimed,
    IdleBegin,
    IdleEnd,
    IdleDaily,
    Debug {
        limit: i64,
        ack: oneshot::Sender<Result<usize, ExpirationError>>,
    },
    Reload(ExpirationConfig),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the background expiration task.
///
/// Dropping every handle stops the task without a final step; call
/// [`ExpirationService::shutdown`] for an orderly stop.
#[derive(Clone)]
pub struct ExpirationService {
    commands: mpsc::Sender<Command>,
    idle_slice: Arc<Notify>,
}

impl ExpirationService {
    /// Spawn the service over `store`.
    ///
    /// If the store cannot be prepared the task stays alive but inert:
    /// every trigger is ignored and shutdown completes without a final
    /// step. Expiration is maintenance, its absence must not take the
    /// host down.
    pub fn start<S>(
        store: S,
        config: ExpirationConfig,
        observers: Vec<Arc<dyn RemovalObserver>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self
    where
        S: StoreExecutor + Send + 'static,
    {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let idle_slice = Arc::new(Notify::new());

        let mut expiration = Expiration::new(store, config);
        for observer in observers {
            expiration.add_observer(observer);
        }
        expiration.set_metrics(metrics);

        let worker = Worker {
            expiration,
            rx,
            commands: commands.clone(),
            idle_slice: Arc::clone(&idle_slice),
            timer: None,
            inert: false,
            shutting_down: false,
        };
        tokio::spawn(worker.run());

        Self {
            commands,
            idle_slice,
        }
    }

    /// The host became idle; cleanup steps may run until idle ends.
    pub async fn notify_idle_begin(&self) {
        let _ = self.commands.send(Command::IdleBegin).await;
    }

    /// The host is active again.
    pub async fn notify_idle_end(&self) {
        let _ = self.commands.send(Command::IdleEnd).await;
    }

    /// Once-a-day deep cleanup trigger.
    pub async fn notify_idle_daily(&self) {
        let _ = self.commands.send(Command::IdleDaily).await;
    }

    /// A short idle slice is available right now; a deferred timed step
    /// waiting for one will run.
    pub fn notify_idle_slice(&self) {
        self.idle_slice.notify_waiters();
    }

    /// Swap in a new configuration.
    pub async fn reload_config(&self, config: ExpirationConfig) {
        let _ = self.commands.send(Command::Reload(config)).await;
    }

    /// Run one operator-requested step with an explicit row limit and wait
    /// for it; returns the number of removal events.
    pub async fn debug_expire(&self, limit: i64) -> Result<usize, ExpirationError> {
        let (ack, response) = oneshot::channel();
        if self
            .commands
            .send(Command::Debug { limit, ack })
            .await
            .is_err()
        {
            return Err(ExpirationError::Setup("service stopped".to_string()));
        }
        response
            .await
            .unwrap_or_else(|_| Err(ExpirationError::Setup("service stopped".to_string())))
    }

    /// Stop the service, running one final step first if the store is
    /// known dirty. Completes once the task has acknowledged.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

/// Timed-step classification from capacity pressure.
fn classify_timed(record_count: u64, capacity: u64) -> (Action, SizeClass) {
    let over = record_count.saturating_sub(capacity);
    if over > OVERLIMIT_RECORDS_THRESHOLD {
        (Action::TIMED_OVERLIMIT, SizeClass::Large)
    } else if over > 0 {
        (Action::TIMED_OVERLIMIT, SizeClass::Small)
    } else {
        (Action::TIMED, SizeClass::Small)
    }
}

struct Worker<S: StoreExecutor> {
    expiration: Expiration<S>,
    rx: mpsc::Receiver<Command>,
    commands: mpsc::Sender<Command>,
    idle_slice: Arc<Notify>,
    timer: Option<Interval>,
    inert: bool,
    shutting_down: bool,
}

impl<S: StoreExecutor> Worker<S> {
    async fn run(mut self) {
        if let Err(err) = self.expiration.setup() {
            error!("expiration service disabled: {err}");
            self.inert = true;
        } else {
            self.renew_timer();
            info!("expiration service started");
        }

        loop {
            tokio::select! {
                _ = Self::timer_tick(&mut self.timer) => self.on_timer_fired(),
                command = self.rx.recv() => match command {
                    Some(command) => {
                        if self.handle(command) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("expiration service stopped");
    }

    async fn timer_tick(timer: &mut Option<Interval>) {
        match timer {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Timed steps yield to foreground work: wait for an idle slice, but
    /// never longer than [`MAX_TIMER_DEFER`]. The wait runs off-task so a
    /// busy host cannot block shutdown.
    fn on_timer_fired(&self) {
        let idle_slice = Arc::clone(&self.idle_slice);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = idle_slice.notified() => {}
                _ = sleep(MAX_TIMER_DEFER) => {}
            }
            let _ = commands.send(Command::RunTimed).await;
        });
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::RunTimed => {
                if !self.inert && !self.shutting_down {
                    let capacity = self.expiration.capacity_limit();
                    let count = self.expiration.record_count();
                    let (action, size) = classify_timed(count, capacity);
                    self.run_step(action, size);
                }
                false
            }
            Command::IdleBegin => {
                // No timed steps while idle; the idle triggers cover it.
                self.timer = None;
                if !self.inert && self.expiration.expire_on_idle() {
                    self.run_step(Action::IDLE_DIRTY, SizeClass::Large);
                }
                false
            }
            Command::IdleEnd => {
                if !self.inert && !self.shutting_down && self.timer.is_none() {
                    self.renew_timer();
                }
                false
            }
            Command::IdleDaily => {
                if !self.inert {
                    self.run_step(Action::IDLE_DAILY, SizeClass::Large);
                }
                false
            }
            Command::Debug { limit, ack } => {
                let result = if self.inert {
                    Err(ExpirationError::Setup("service disabled".to_string()))
                } else {
                    self.expiration
                        .debug_expire(limit)
                        .map(|outcome| outcome.events.len())
                };
                let _ = ack.send(result);
                false
            }
            Command::Reload(config) => {
                let delta = self.expiration.reload_config(config);
                if delta.interval_changed && !self.inert && !self.shutting_down {
                    self.renew_timer();
                }
                false
            }
            Command::Shutdown(ack) => {
                self.shutting_down = true;
                self.timer = None;
                if !self.inert {
                    self.expiration.begin_shutdown();
                    if self.expiration.status() == Status::Dirty {
                        self.run_step(Action::SHUTDOWN_DIRTY, SizeClass::Large);
                    }
                }
                let _ = ack.send(());
                true
            }
        }
    }

    // Failures are already logged by the controller; the scheduler only
    // reacts to status flips.
    fn run_step(&mut self, action: Action, size: SizeClass) {
        if let Ok(outcome) = self.expiration.expire(action, size) {
            if outcome.status_changed && !self.shutting_down {
                self.renew_timer();
            }
        }
    }

    /// (Re)arm the timed-step timer. A dirty store steps at the nominal
    /// interval; a clean or unknown one steps less often.
    fn renew_timer(&mut self) {
        let mut period = self.expiration.config().interval();
        if self.expiration.status() != Status::Dirty {
            period *= EXPIRE_AGGRESSIVITY_MULTIPLIER as u32;
        }
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(interval);
        debug!(seconds = period.as_secs(), "expiration timer renewed");
    }
}
