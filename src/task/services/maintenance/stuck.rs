//! Detection and recovery of tasks that stopped making progress.

use super::{cutoff, MaintenanceError};
use crate::config::{StuckTaskConfig, StuckTaskPolicy};
use crate::task::{
    domain::{Task, TaskFilter, TaskStatus},
    ports::TaskStore,
    services::TaskDispatch,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a task is considered stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckReason {
    /// In progress without a heartbeat since `since`.
    Inactive {
        /// Last heartbeat.
        since: DateTime<Utc>,
        /// Configured inactivity timeout.
        timeout: Duration,
    },
    /// Waiting since `since` without being picked up.
    NeverStarted {
        /// Creation time.
        since: DateTime<Utc>,
        /// Configured wait timeout.
        timeout: Duration,
    },
}

impl fmt::Display for StuckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive { since, timeout } => write!(
                f,
                "no executor activity since {since} (inactivity timeout {}s)",
                timeout.as_secs()
            ),
            Self::NeverStarted { since, timeout } => write!(
                f,
                "waiting since {since} without being started (wait timeout {}s)",
                timeout.as_secs()
            ),
        }
    }
}

/// Counters for one stuck-task scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StuckScanReport {
    /// Tasks matching either staleness criterion.
    pub found: usize,
    /// Tasks marked as failed.
    pub failed: usize,
    /// Tasks re-dispatched.
    pub restarted: usize,
    /// Tasks whose recovery failed.
    pub errors: usize,
    /// Tasks left alone because their status changed after the lookup.
    pub skipped: usize,
}

/// Background loop recovering stuck tasks with a fixed policy.
pub struct StuckTaskMonitor<S, D, C>
where
    S: TaskStore,
    D: TaskDispatch,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    dispatcher: Arc<D>,
    clock: Arc<C>,
    config: StuckTaskConfig,
}

impl<S, D, C> StuckTaskMonitor<S, D, C>
where
    S: TaskStore,
    D: TaskDispatch,
    C: Clock + Send + Sync,
{
    /// Creates a monitor.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        dispatcher: Arc<D>,
        clock: Arc<C>,
        config: StuckTaskConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
        }
    }

    /// Scans every configured interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let interval = self.config.interval();
        info!(?interval, policy = ?self.config.policy, "stuck task monitor started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    match self.scan().await {
                        Ok(report) if report.found == 0 => debug!("no stuck tasks"),
                        Ok(report) => info!(
                            found = report.found,
                            failed = report.failed,
                            restarted = report.restarted,
                            errors = report.errors,
                            skipped = report.skipped,
                            "stuck tasks recovered"
                        ),
                        Err(err) => error!(error = %err, "stuck task scan failed"),
                    }
                }
            }
        }
        info!("stuck task monitor stopped");
    }

    /// Finds stuck tasks and applies the configured policy once.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError`] when the lookup fails, or when the
    /// failure batch cannot be written. Per-task restart failures are
    /// logged and counted instead.
    ///
    /// A task is only failed while its stored status still matches the one
    /// seen by the lookup, so a task finished in the meantime keeps its
    /// result.
    pub async fn scan(&self) -> Result<StuckScanReport, MaintenanceError> {
        let stuck = self.find_stuck().await?;
        let mut report = StuckScanReport {
            found: stuck.len(),
            ..StuckScanReport::default()
        };
        if stuck.is_empty() {
            return Ok(report);
        }

        match self.config.policy {
            StuckTaskPolicy::Fail => {
                let mut batch = Vec::with_capacity(stuck.len());
                for (mut task, reason) in stuck {
                    let observed = task.status();
                    match task.fail(reason.to_string(), &*self.clock) {
                        Ok(()) => batch.push((task, observed)),
                        Err(err) => {
                            report.errors += 1;
                            warn!(
                                task_id = %task.id(),
                                error = %err,
                                "stuck task cannot be failed"
                            );
                        }
                    }
                }
                // An executor may finish a task between the lookup and this write.
                let written = self.store.update_batch_if_status(&batch).await?;
                report.failed = written.len();
                report.skipped = batch.len() - written.len();
                for (task, _) in batch.iter().filter(|(task, _)| !written.contains(&task.id())) {
                    debug!(task_id = %task.id(), "stuck task moved on before it was failed");
                }
            }
            StuckTaskPolicy::Restart => {
                for (task, reason) in stuck {
                    match self.dispatcher.dispatch(&task).await {
                        Ok(()) => {
                            report.restarted += 1;
                            info!(task_id = %task.id(), %reason, "stuck task re-dispatched");
                        }
                        Err(err) => {
                            report.errors += 1;
                            warn!(
                                task_id = %task.id(),
                                error = %err,
                                "stuck task restart failed"
                            );
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    /// Returns stuck tasks with the reason each one matched.
    ///
    /// A task exactly at a threshold is not stuck yet.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError`] when the store lookup fails.
    pub async fn find_stuck(&self) -> Result<Vec<(Task, StuckReason)>, MaintenanceError> {
        let now = self.clock.utc();
        let inactivity_timeout = self.config.inactivity_timeout();
        let wait_timeout = self.config.wait_timeout();

        let inactive = self
            .store
            .get_all(
                &TaskFilter::new()
                    .with_statuses([TaskStatus::InProgress])
                    .last_activity_before(cutoff(now, inactivity_timeout)?),
            )
            .await?
            .items
            .into_iter()
            .filter_map(|task| {
                let since = task.last_activity_date()?;
                Some((
                    task,
                    StuckReason::Inactive {
                        since,
                        timeout: inactivity_timeout,
                    },
                ))
            });

        let waiting = self
            .store
            .get_all(
                &TaskFilter::new()
                    .with_statuses([TaskStatus::Wait])
                    .added_before(cutoff(now, wait_timeout)?),
            )
            .await?
            .items
            .into_iter()
            .map(|task| {
                let since = task.date_added();
                (
                    task,
                    StuckReason::NeverStarted {
                        since,
                        timeout: wait_timeout,
                    },
                )
            });

        Ok(inactive.chain(waiting).collect())
    }
}
