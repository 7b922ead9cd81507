//! Runs the stuck-task monitor and retention cleaner against shared storage.
//!
//! Usage:
//!
//! ```text
//! TASKLANE_DATABASE_URL=postgres://... \
//! TASKLANE_AMQP_URL=amqp://... \
//! TASKLANE_TASK_TYPES=Report,Invoice \
//! tasklane-maintenance
//! ```
//!
//! Every setting is read from `TASKLANE_*` variables. The AMQP connection is
//! only opened when stuck tasks are restarted, the one policy that publishes.
//! The process runs until interrupted, then lets each loop finish its
//! current cycle.

use async_trait::async_trait;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use mockable::DefaultClock;
use std::sync::Arc;
use tasklane::config::{ConfigError, EngineConfig, StuckTaskPolicy};
use tasklane::task::{
    adapters::{
        amqp::AmqpMessageBus,
        postgres::{PostgresTaskStore, TaskPgPool},
    },
    domain::{Task, TaskDomainError, TaskTypeName, TaskTypeRegistration, TaskTypeRegistry},
    ports::MessageBusError,
    services::{
        BackgroundLoops, DispatchError, RetentionCleaner, RetentionPolicy, StuckTaskMonitor,
        TaskDispatch, TaskDispatcher,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that stop the service before its loops start.
#[derive(Debug, Error)]
enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} must be set")]
    MissingSetting(&'static str),

    #[error("database pool could not be created: {0}")]
    Pool(#[from] PoolError),

    #[error("message bus unavailable: {0}")]
    Bus(#[from] MessageBusError),

    #[error(transparent)]
    Registry(#[from] TaskDomainError),

    #[error("dispatcher composition failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("shutdown signal could not be awaited: {0}")]
    Signal(#[from] std::io::Error),
}

/// Builds a registry routing each named type by name only.
fn routed_registry(names: &[String]) -> Result<TaskTypeRegistry, TaskDomainError> {
    names.iter().try_fold(TaskTypeRegistry::new(), |registry, name| {
        registry.with(TaskTypeRegistration::untyped(TaskTypeName::new(
            name.as_str(),
        )?))
    })
}

fn connect_pool(config: &EngineConfig) -> Result<TaskPgPool, ServiceError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or(ServiceError::MissingSetting("TASKLANE_DATABASE_URL"))?;
    Ok(Pool::builder().build(ConnectionManager::<PgConnection>::new(url))?)
}

/// Dispatcher for hosts without a bus; every publish is refused.
struct Unrouted;

#[async_trait]
impl TaskDispatch for Unrouted {
    async fn dispatch(&self, task: &Task) -> Result<(), DispatchError> {
        Err(DispatchError::UnroutedType(task.task_type().clone()))
    }
}

async fn spawn_stuck_monitor(
    loops: &mut BackgroundLoops,
    config: &EngineConfig,
    store: &Arc<PostgresTaskStore>,
    clock: &Arc<DefaultClock>,
) -> Result<(), ServiceError> {
    let amqp_url = match (config.stuck_tasks.policy, config.amqp_url.as_deref()) {
        (StuckTaskPolicy::Fail, _) => None,
        (StuckTaskPolicy::Restart, Some(url)) => Some(url),
        (StuckTaskPolicy::Restart, None) => {
            return Err(ServiceError::MissingSetting("TASKLANE_AMQP_URL"));
        }
    };
    let Some(url) = amqp_url else {
        loops.spawn_stuck_monitor(StuckTaskMonitor::new(
            Arc::clone(store),
            Arc::new(Unrouted),
            Arc::clone(clock),
            config.stuck_tasks.clone(),
        ));
        return Ok(());
    };

    let bus = Arc::new(AmqpMessageBus::connect(url).await?);
    let registry = Arc::new(routed_registry(&config.task_types)?);
    let dispatcher = TaskDispatcher::compose(bus, registry, &config.bus).await?;
    loops.spawn_stuck_monitor(StuckTaskMonitor::new(
        Arc::clone(store),
        Arc::new(dispatcher),
        Arc::clone(clock),
        config.stuck_tasks.clone(),
    ));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let installed = tasklane::telemetry::init();
    debug!(installed, "logging initialised");
    let config = EngineConfig::from_env()?;
    let store = Arc::new(PostgresTaskStore::new(connect_pool(&config)?));
    let clock = Arc::new(DefaultClock);
    let mut loops = BackgroundLoops::new();

    if config.stuck_tasks.enabled {
        spawn_stuck_monitor(&mut loops, &config, &store, &clock).await?;
    }
    if config.retention.enabled {
        let policy = RetentionPolicy::try_from(&config.retention)?;
        loops.spawn_retention(RetentionCleaner::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            policy,
            config.retention.interval(),
        ));
    }

    if loops.is_empty() {
        warn!("every maintenance loop is disabled, exiting");
        return Ok(());
    }
    info!(loops = loops.len(), "maintenance service running");
    let signal = tokio::signal::ctrl_c().await;
    loops.shutdown().await;
    signal?;
    Ok(())
}
