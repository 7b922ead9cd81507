//! Periodic purge of finished tasks.

use super::{cutoff, MaintenanceError};
use crate::config::{ConfigError, RetentionConfig};
use crate::task::{
    domain::{TaskFilter, TaskStatus, TaskTypeName},
    ports::TaskStore,
};
use mockable::Clock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const FETCH_PAGE: usize = 500;

/// Retention ages, validated from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    global: Option<Duration>,
    per_type: BTreeMap<TaskTypeName, Duration>,
}

impl RetentionPolicy {
    /// Creates a policy with an optional global age.
    #[must_use]
    pub fn new(global_days: Option<u32>) -> Self {
        Self {
            global: global_days.map(days),
            per_type: BTreeMap::new(),
        }
    }

    /// Adds a per-type override.
    #[must_use]
    pub fn with_override(mut self, task_type: TaskTypeName, retention_days: u32) -> Self {
        self.per_type.insert(task_type, days(retention_days));
        self
    }

    /// Builds the deletion filters for one purge, overrides first.
    ///
    /// Overrides include exactly their type; the global filter excludes every
    /// overridden type. Only terminal tasks are ever matched.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::AgeOutOfRange`] when an age cannot be
    /// subtracted from `now`.
    pub fn filters(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<TaskFilter>, MaintenanceError> {
        let terminal = || TaskFilter::new().with_statuses(TaskStatus::TERMINAL);
        let mut filters = self
            .per_type
            .iter()
            .map(|(task_type, age)| {
                Ok(terminal()
                    .including_types([task_type.clone()])
                    .added_before(cutoff(now, *age)?))
            })
            .collect::<Result<Vec<_>, MaintenanceError>>()?;
        if let Some(age) = self.global {
            filters.push(
                terminal()
                    .excluding_types(self.per_type.keys().cloned())
                    .added_before(cutoff(now, age)?),
            );
        }
        Ok(filters)
    }
}

impl TryFrom<&RetentionConfig> for RetentionPolicy {
    type Error = ConfigError;

    fn try_from(config: &RetentionConfig) -> Result<Self, Self::Error> {
        config
            .type_days
            .iter()
            .try_fold(Self::new(config.global_days), |policy, (name, retention_days)| {
                let task_type =
                    TaskTypeName::new(name.as_str()).map_err(|err| ConfigError::InvalidValue {
                        key: "retention.type_days".to_owned(),
                        value: name.clone(),
                        reason: err.to_string(),
                    })?;
                Ok(policy.with_override(task_type, *retention_days))
            })
    }
}

fn days(count: u32) -> Duration {
    Duration::from_secs(u64::from(count) * SECONDS_PER_DAY)
}

/// Background loop deleting terminal tasks past their retention age.
pub struct RetentionCleaner<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    policy: RetentionPolicy,
    interval: Duration,
}

impl<S, C> RetentionCleaner<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a cleaner.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        clock: Arc<C>,
        policy: RetentionPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            interval,
        }
    }

    /// Purges every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "retention cleaner started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {
                    match self.purge().await {
                        Ok(0) => debug!("nothing to purge"),
                        Ok(removed) => info!(removed, "expired tasks purged"),
                        Err(err) => error!(error = %err, "retention purge failed"),
                    }
                }
            }
        }
        info!("retention cleaner stopped");
    }

    /// Deletes every expired task once and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError`] when the store fails.
    pub async fn purge(&self) -> Result<usize, MaintenanceError> {
        let mut removed = 0;
        for filter in self.policy.filters(self.clock.utc())? {
            removed += if self.store.supports_bulk_delete() {
                self.store.bulk_delete(&filter).await?
            } else {
                self.fetch_and_delete(filter).await?
            };
        }
        Ok(removed)
    }

    async fn fetch_and_delete(&self, filter: TaskFilter) -> Result<usize, MaintenanceError> {
        let page_filter = filter.with_limit(FETCH_PAGE);
        let mut removed = 0;
        loop {
            let page = self.store.get_all(&page_filter).await?;
            if page.items.is_empty() {
                break;
            }
            let ids: Vec<_> = page.items.iter().map(|task| task.id()).collect();
            let deleted = self.store.delete(&ids).await?;
            removed += deleted;
            if deleted == 0 || page.total <= page.items.len() {
                break;
            }
        }
        Ok(removed)
    }
}
