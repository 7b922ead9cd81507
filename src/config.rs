//! Engine configuration.
//!
//! Every option has a default, so an empty JSON object or an empty
//! environment yields a working single-instance configuration. Durations are
//! whole seconds.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix of every environment variable read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "TASKLANE_";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable or field holds a value of the wrong shape.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Variable or field name.
        key: String,
        /// Offending value.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A cron expression does not parse.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// Offending expression.
        expression: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A configuration document is not valid JSON for [`EngineConfig`].
    #[error("malformed configuration document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `PostgreSQL` connection string for the store and lock table.
    pub database_url: Option<String>,
    /// AMQP broker URL.
    pub amqp_url: Option<String>,
    /// Topic naming and creation.
    pub bus: BusConfig,
    /// Task generation loops.
    pub scheduler: SchedulerConfig,
    /// Stuck-task recovery loop.
    pub stuck_tasks: StuckTaskConfig,
    /// Retention cleanup loop.
    pub retention: RetentionConfig,
    /// Type names routed by hosts that do not link the task kinds.
    pub task_types: Vec<String>,
}

/// Message bus topic settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Partitions per topic.
    pub partitions: u32,
    /// Replication factor per topic.
    pub replication_factor: u16,
    /// Optional application-scoped topic prefix.
    pub topic_prefix: Option<String>,
    /// Optional application-scoped consumer-group prefix.
    pub consumer_group_prefix: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            replication_factor: 1,
            topic_prefix: None,
            consumer_group_prefix: None,
        }
    }
}

/// How a scheduler paces its cycles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// Fixed delay between cycles.
    Interval {
        /// Delay in seconds.
        seconds: u64,
    },
    /// Cycles at the occurrences of a cron expression (seconds field first).
    Cron {
        /// Cron expression.
        expression: String,
    },
}

/// Scheduler loops and their kill switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Global kill switch.
    pub enabled: bool,
    /// Per-type kill switches; absent types are enabled.
    pub type_enabled: BTreeMap<String, bool>,
    /// Upper bound on lock hold time and lock wait, in seconds.
    pub watchdog_secs: u64,
    /// Delay between lock acquisition attempts, in milliseconds.
    pub lock_poll_millis: u64,
    /// Schedule per task type.
    pub schedules: BTreeMap<String, ScheduleConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            type_enabled: BTreeMap::new(),
            watchdog_secs: 60,
            lock_poll_millis: 250,
            schedules: BTreeMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Returns the watchdog timeout.
    #[must_use]
    pub const fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    /// Returns the lock polling delay.
    #[must_use]
    pub const fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_millis)
    }
}

/// Recovery policy for stuck tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckTaskPolicy {
    /// Mark stuck tasks as failed.
    #[default]
    Fail,
    /// Re-dispatch stuck tasks without touching their status.
    Restart,
}

impl FromStr for StuckTaskPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "restart" => Ok(Self::Restart),
            other => Err(format!("expected 'fail' or 'restart', got '{other}'")),
        }
    }
}

/// Stuck-task detection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StuckTaskConfig {
    /// Whether the loop runs at all.
    pub enabled: bool,
    /// Delay between scans, in seconds.
    pub interval_secs: u64,
    /// In-progress tasks without a heartbeat for longer are stuck.
    pub inactivity_timeout_secs: u64,
    /// Waiting tasks older than this are stuck.
    pub wait_timeout_secs: u64,
    /// What to do with stuck tasks.
    pub policy: StuckTaskPolicy,
}

impl Default for StuckTaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            inactivity_timeout_secs: 600,
            wait_timeout_secs: 3600,
            policy: StuckTaskPolicy::Fail,
        }
    }
}

impl StuckTaskConfig {
    /// Returns the scan interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the inactivity timeout.
    #[must_use]
    pub const fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    /// Returns the wait timeout.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Retention cleanup settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether the loop runs at all.
    pub enabled: bool,
    /// Delay between purges, in seconds.
    pub interval_secs: u64,
    /// Retention for every type without an override; `None` keeps them.
    pub global_days: Option<u32>,
    /// Per-type retention overrides.
    pub type_days: BTreeMap<String, u32>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 24 * 60 * 60,
            global_days: Some(30),
            type_days: BTreeMap::new(),
        }
    }
}

impl RetentionConfig {
    /// Returns the purge interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl EngineConfig {
    /// Parses a JSON configuration document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Document`] when the document is malformed, or
    /// [`ConfigError::InvalidValue`] when [`EngineConfig::validate`] fails.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `TASKLANE_*` environment variables on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is malformed or
    /// the result fails [`EngineConfig::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        config.database_url = var("DATABASE_URL");
        config.amqp_url = var("AMQP_URL");

        if let Some(value) = var("BUS_PARTITIONS") {
            config.bus.partitions = parse("BUS_PARTITIONS", &value)?;
        }
        if let Some(value) = var("BUS_REPLICATION_FACTOR") {
            config.bus.replication_factor = parse("BUS_REPLICATION_FACTOR", &value)?;
        }
        config.bus.topic_prefix = var("TOPIC_PREFIX");
        config.bus.consumer_group_prefix = var("CONSUMER_GROUP_PREFIX");

        if let Some(value) = var("SCHEDULER_ENABLED") {
            config.scheduler.enabled = parse("SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = var("SCHEDULER_DISABLED_TYPES") {
            config.scheduler.type_enabled = comma_list(&value)
                .map(|name| (name.to_owned(), false))
                .collect();
        }
        if let Some(value) = var("SCHEDULER_WATCHDOG_SECS") {
            config.scheduler.watchdog_secs = parse("SCHEDULER_WATCHDOG_SECS", &value)?;
        }

        if let Some(value) = var("STUCK_ENABLED") {
            config.stuck_tasks.enabled = parse("STUCK_ENABLED", &value)?;
        }
        if let Some(value) = var("STUCK_INTERVAL_SECS") {
            config.stuck_tasks.interval_secs = parse("STUCK_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = var("STUCK_INACTIVITY_SECS") {
            config.stuck_tasks.inactivity_timeout_secs = parse("STUCK_INACTIVITY_SECS", &value)?;
        }
        if let Some(value) = var("STUCK_WAIT_SECS") {
            config.stuck_tasks.wait_timeout_secs = parse("STUCK_WAIT_SECS", &value)?;
        }
        if let Some(value) = var("STUCK_POLICY") {
            config.stuck_tasks.policy = parse("STUCK_POLICY", &value)?;
        }

        if let Some(value) = var("RETENTION_ENABLED") {
            config.retention.enabled = parse("RETENTION_ENABLED", &value)?;
        }
        if let Some(value) = var("RETENTION_DAYS") {
            config.retention.global_days = if value.trim().is_empty() {
                None
            } else {
                Some(parse("RETENTION_DAYS", &value)?)
            };
        }
        if let Some(value) = var("RETENTION_TYPE_DAYS") {
            config.retention.type_days = parse_type_days(&value)?;
        }
        if let Some(value) = var("TASK_TYPES") {
            config.task_types = comma_list(&value).map(str::to_owned).collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects zero intervals, which would make a loop spin against the
    /// store, and a zero watchdog, which would grant leases that are already
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fixed = [
            ("scheduler.watchdog_secs", self.scheduler.watchdog_secs),
            ("scheduler.lock_poll_millis", self.scheduler.lock_poll_millis),
            ("stuck_tasks.interval_secs", self.stuck_tasks.interval_secs),
            ("retention.interval_secs", self.retention.interval_secs),
        ]
        .map(|(key, value)| (key.to_owned(), value));
        let schedules = self
            .scheduler
            .schedules
            .iter()
            .filter_map(|(name, schedule)| match schedule {
                ScheduleConfig::Interval { seconds } => {
                    Some((format!("scheduler.schedules.{name}.seconds"), *seconds))
                }
                ScheduleConfig::Cron { .. } => None,
            });

        fixed
            .into_iter()
            .chain(schedules)
            .find(|(_, value)| *value == 0)
            .map_or(Ok(()), |(key, _)| {
                Err(ConfigError::InvalidValue {
                    key,
                    value: "0".to_owned(),
                    reason: "must be greater than zero".to_owned(),
                })
            })
    }
}

fn comma_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{name}"),
            value: value.to_owned(),
            reason: err.to_string(),
        })
}

/// Parses `Type=days` pairs separated by commas.
fn parse_type_days(value: &str) -> Result<BTreeMap<String, u32>, ConfigError> {
    comma_list(value)
        .map(|pair| {
            let (name, days) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}RETENTION_TYPE_DAYS"),
                value: pair.to_owned(),
                reason: "expected Type=days".to_owned(),
            })?;
            Ok((name.trim().to_owned(), parse("RETENTION_TYPE_DAYS", days)?))
        })
        .collect()
}
