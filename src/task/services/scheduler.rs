//! Recurring task generation under a named distributed lock.
//!
//! A [`TaskScheduler`] owns one cooperative loop. Every cycle it checks the
//! kill switches, takes the lock named after the scheduler, asks its
//! [`TaskBatchSource`] for new tasks and runs them through the
//! [`TaskManager`] in the order the source returned them. Instances sharing a
//! name never generate concurrently, whichever process they run in.

use super::dispatcher::TaskDispatch;
use super::manager::TaskManager;
use crate::config::{ConfigError, ScheduleConfig, SchedulerConfig};
use crate::task::{
    domain::{Task, TaskTypeName},
    ports::{acquire_within, DistributedLock, LockError, TaskStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default watchdog: bounds lock waits, lease lifetimes and batch source calls.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(60);

const DEFAULT_LOCK_POLL: Duration = Duration::from_millis(250);

/// Error type returned by batch sources.
pub type BatchSourceError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the tasks a scheduler should run this cycle.
#[async_trait]
pub trait TaskBatchSource: Send + Sync {
    /// Returns new waiting tasks, in dispatch order.
    async fn next_batch(&self) -> Result<Vec<Task>, BatchSourceError>;
}

/// Pacing strategy between cycles.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed delay.
    Interval(Duration),
    /// Next occurrence of a cron expression.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parses a cron expression (seconds field first).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCron`] when the expression is malformed.
    pub fn cron(expression: &str) -> Result<Self, ConfigError> {
        cron::Schedule::from_str(expression)
            .map(|schedule| Self::Cron(Box::new(schedule)))
            .map_err(|err| ConfigError::InvalidCron {
                expression: expression.to_owned(),
                reason: err.to_string(),
            })
    }

    /// Builds a schedule from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCron`] when a cron expression is
    /// malformed.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        match config {
            ScheduleConfig::Interval { seconds } => {
                Ok(Self::Interval(Duration::from_secs(*seconds)))
            }
            ScheduleConfig::Cron { expression } => Self::cron(expression),
        }
    }

    /// Returns the delay before the next cycle, or `None` when a cron
    /// expression has no occurrence after `now`.
    #[must_use]
    pub fn delay_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Interval(interval) => Some(*interval),
            Self::Cron(schedule) => schedule
                .after(&now)
                .next()
                .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO)),
        }
    }
}

/// Global and per-type kill switches, shared by every scheduler.
///
/// Switches can be flipped at runtime; each cycle reads the current state.
#[derive(Debug, Clone)]
pub struct EnableSwitches {
    inner: Arc<SwitchState>,
}

#[derive(Debug)]
struct SwitchState {
    global: AtomicBool,
    disabled_types: RwLock<BTreeSet<String>>,
}

impl Default for EnableSwitches {
    fn default() -> Self {
        Self {
            inner: Arc::new(SwitchState {
                global: AtomicBool::new(true),
                disabled_types: RwLock::new(BTreeSet::new()),
            }),
        }
    }
}

impl EnableSwitches {
    /// Creates switches with everything enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates switches from scheduler configuration.
    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let disabled = config
            .type_enabled
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(name, _)| name.clone())
            .collect();
        Self {
            inner: Arc::new(SwitchState {
                global: AtomicBool::new(config.enabled),
                disabled_types: RwLock::new(disabled),
            }),
        }
    }

    /// Flips the global switch.
    pub fn set_global(&self, enabled: bool) {
        self.inner.global.store(enabled, Ordering::SeqCst);
    }

    /// Flips the switch for one task type.
    pub fn set_type(&self, task_type: &TaskTypeName, enabled: bool) {
        let mut disabled = self
            .inner
            .disabled_types
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if enabled {
            disabled.remove(task_type.as_str());
        } else {
            disabled.insert(task_type.as_str().to_owned());
        }
    }

    /// Returns `true` when both the global and the type switch are on.
    #[must_use]
    pub fn is_enabled(&self, task_type: &TaskTypeName) -> bool {
        self.inner.global.load(Ordering::SeqCst)
            && !self
                .inner
                .disabled_types
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(task_type.as_str())
    }
}

/// Identity and timing of one scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    name: String,
    task_type: TaskTypeName,
    schedule: Schedule,
    watchdog: Duration,
    lock_poll: Duration,
}

impl SchedulerSettings {
    /// Creates settings for a scheduler named after `task_type`.
    #[must_use]
    pub fn new(task_type: TaskTypeName, schedule: Schedule) -> Self {
        Self {
            name: task_type.as_str().to_owned(),
            task_type,
            schedule,
            watchdog: DEFAULT_WATCHDOG,
            lock_poll: DEFAULT_LOCK_POLL,
        }
    }

    /// Builds settings for `task_type` from its entry in
    /// [`SchedulerConfig::schedules`], with the configured watchdog and
    /// polling delay.
    ///
    /// Returns `Ok(None)` when the type has no schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCron`] when its cron expression is
    /// malformed.
    pub fn from_config(
        task_type: &TaskTypeName,
        config: &SchedulerConfig,
    ) -> Result<Option<Self>, ConfigError> {
        config
            .schedules
            .get(task_type.as_str())
            .map(|schedule| {
                let pacing = Schedule::from_config(schedule)?;
                Ok(Self::new(task_type.clone(), pacing).with_config(config))
            })
            .transpose()
    }

    /// Overrides the lock name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the watchdog timeout.
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Overrides the delay between lock attempts.
    #[must_use]
    pub fn with_lock_poll(mut self, lock_poll: Duration) -> Self {
        self.lock_poll = lock_poll;
        self
    }

    /// Applies the watchdog and polling delay from configuration.
    #[must_use]
    pub fn with_config(self, config: &SchedulerConfig) -> Self {
        self.with_watchdog(config.watchdog())
            .with_lock_poll(config.lock_poll())
    }

    /// Returns the scheduler (and lock) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task type governed by the per-type kill switch.
    #[must_use]
    pub const fn task_type(&self) -> &TaskTypeName {
        &self.task_type
    }

    /// Returns the pacing strategy.
    #[must_use]
    pub const fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Returns the watchdog timeout.
    #[must_use]
    pub const fn watchdog(&self) -> Duration {
        self.watchdog
    }
}

/// Errors that abandon a scheduler cycle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Another instance held the lock for the whole wait window.
    #[error("scheduler '{name}' could not take its lock within {waited:?}")]
    LockTimeout {
        /// Scheduler name.
        name: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The lock backend failed.
    #[error(transparent)]
    Lock(LockError),

    /// The batch source failed.
    #[error("batch source for scheduler '{name}' failed: {source}")]
    Source {
        /// Scheduler name.
        name: String,
        /// Source error.
        source: BatchSourceError,
    },

    /// The batch source overran the watchdog.
    #[error("batch source for scheduler '{name}' exceeded the {limit:?} watchdog")]
    Watchdog {
        /// Scheduler name.
        name: String,
        /// Watchdog timeout.
        limit: Duration,
    },
}

/// Outcome of one scheduler cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A kill switch was off; the lock was not touched.
    Disabled,
    /// The batch was handed to the manager.
    Completed {
        /// Tasks persisted and dispatched.
        started: usize,
        /// Tasks the manager rejected.
        failed: usize,
    },
}

/// One generation loop.
pub struct TaskScheduler<S, D, C>
where
    S: TaskStore,
    D: TaskDispatch,
    C: Clock + Send + Sync,
{
    settings: SchedulerSettings,
    source: Arc<dyn TaskBatchSource>,
    manager: TaskManager<S, D>,
    lock: Arc<dyn DistributedLock>,
    switches: EnableSwitches,
    clock: Arc<C>,
}

impl<S, D, C> TaskScheduler<S, D, C>
where
    S: TaskStore,
    D: TaskDispatch,
    C: Clock + Send + Sync,
{
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        source: Arc<dyn TaskBatchSource>,
        manager: TaskManager<S, D>,
        lock: Arc<dyn DistributedLock>,
        switches: EnableSwitches,
        clock: Arc<C>,
    ) -> Self {
        Self {
            settings,
            source,
            manager,
            lock,
            switches,
            clock,
        }
    }

    /// Returns the scheduler settings.
    #[must_use]
    pub const fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// Each cycle waits for the schedule first. Cycle failures are logged and
    /// the loop carries on. A cycle in flight when cancellation arrives
    /// finishes its batch.
    pub async fn run(self, cancel: CancellationToken) {
        let name = self.settings.name.clone();
        info!(scheduler = %name, "scheduler started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(delay) = self.settings.schedule.delay_after(self.clock.utc()) else {
                warn!(scheduler = %name, "schedule has no future occurrence, pausing until shutdown");
                cancel.cancelled().await;
                break;
            };
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            match self.run_cycle().await {
                Ok(CycleOutcome::Disabled) => {
                    debug!(scheduler = %name, "scheduler disabled, cycle skipped");
                }
                Ok(CycleOutcome::Completed { started, failed }) => {
                    debug!(scheduler = %name, started, failed, "scheduler cycle completed");
                }
                Err(err) => error!(scheduler = %name, error = %err, "scheduler cycle failed"),
            }
        }
        info!(scheduler = %name, "scheduler stopped");
    }

    /// Runs one generation cycle immediately.
    ///
    /// The lock is released before returning, whatever the outcome. Once the
    /// source has produced a batch, every task in it is run to completion;
    /// only the lease lifetime bounds how long the lock is held.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the lock cannot be taken, or when the
    /// source fails or overruns the watchdog. Individual task failures are
    /// counted in the outcome instead.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, SchedulerError> {
        if !self.switches.is_enabled(&self.settings.task_type) {
            return Ok(CycleOutcome::Disabled);
        }

        let lock_name = self.settings.name.as_str();
        let watchdog = self.settings.watchdog;
        let lease = acquire_within(
            self.lock.as_ref(),
            lock_name,
            watchdog,
            watchdog,
            self.settings.lock_poll,
        )
        .await
        .map_err(|err| match err {
            LockError::Timeout { name, waited } => SchedulerError::LockTimeout { name, waited },
            other => SchedulerError::Lock(other),
        })?;

        let outcome = self.generate().await;

        if let Err(err) = self.lock.release(&lease).await {
            warn!(scheduler = %lock_name, error = %err, "failed to release scheduler lock");
        }
        outcome
    }

    async fn generate(&self) -> Result<CycleOutcome, SchedulerError> {
        // Only the source call is timed: a task handed to the manager must
        // finish, or it could be persisted and never dispatched.
        let watchdog = self.settings.watchdog;
        let batch = tokio::time::timeout(watchdog, self.source.next_batch())
            .await
            .map_err(|_| SchedulerError::Watchdog {
                name: self.settings.name.clone(),
                limit: watchdog,
            })?
            .map_err(|source| SchedulerError::Source {
                name: self.settings.name.clone(),
                source,
            })?;

        let mut started = 0;
        let mut failed = 0;
        for task in batch {
            let task_id = task.id();
            match self.manager.run(task, None, None).await {
                Ok(_) => started += 1,
                Err(err) => {
                    failed += 1;
                    warn!(
                        scheduler = %self.settings.name,
                        %task_id,
                        error = %err,
                        "generated task rejected"
                    );
                }
            }
        }
        Ok(CycleOutcome::Completed { started, failed })
    }
}
