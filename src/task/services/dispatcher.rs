//! Publishes persisted tasks to the message bus.

use super::naming::{TaskRoute, TopicNaming};
use crate::config::BusConfig;
use crate::task::{
    domain::{Task, TaskId, TaskTypeName, TaskTypeRegistry, UserId},
    ports::{Acknowledgement, MessageBus, MessageBusError},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Event consumed by task executors.
///
/// Executors load the full record from the task store by `task_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Task to execute.
    pub task_id: TaskId,
    /// Type discriminator.
    pub task_type: TaskTypeName,
    /// Parent task, if any.
    pub parent_id: Option<TaskId>,
    /// Attributed user, if any.
    pub user_id: Option<UserId>,
    /// Creation timestamp of the task.
    pub date_added: DateTime<Utc>,
}

impl From<&Task> for TaskEvent {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id(),
            task_type: task.task_type().clone(),
            parent_id: task.parent_id(),
            user_id: task.user_id().cloned(),
            date_added: task.date_added(),
        }
    }
}

/// Errors raised while composing routes or publishing events.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route was composed for the task type.
    #[error("no route registered for task type '{0}'")]
    UnroutedType(TaskTypeName),

    /// The broker received the event but did not persist it.
    #[error("event for task {task_id} was not persisted by topic '{topic}'")]
    NotPersisted {
        /// Task whose event was dropped.
        task_id: TaskId,
        /// Target topic.
        topic: String,
    },

    /// The event could not be encoded.
    #[error("failed to encode event for task {task_id}: {source}")]
    Encode {
        /// Task whose event failed.
        task_id: TaskId,
        /// Serializer error.
        source: serde_json::Error,
    },

    /// The bus rejected an operation.
    #[error(transparent)]
    Bus(#[from] MessageBusError),
}

/// Hands a persisted task to its executors.
#[async_trait]
pub trait TaskDispatch: Send + Sync {
    /// Publishes an execution event for `task`.
    ///
    /// Returns only once the event is durably accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the event is not confirmed.
    async fn dispatch(&self, task: &Task) -> Result<(), DispatchError>;
}

/// Bus-backed dispatcher with one route per registered task type.
pub struct TaskDispatcher<B>
where
    B: MessageBus,
{
    bus: Arc<B>,
    registry: Arc<TaskTypeRegistry>,
    routes: BTreeMap<TaskTypeName, TaskRoute>,
}

impl<B> TaskDispatcher<B>
where
    B: MessageBus,
{
    /// Ensures topics and registers producers and consumers for every type in
    /// `registry`.
    ///
    /// Safe to repeat: topic creation and registration are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Bus`] when the bus rejects a declaration.
    pub async fn compose(
        bus: Arc<B>,
        registry: Arc<TaskTypeRegistry>,
        config: &BusConfig,
    ) -> Result<Self, DispatchError> {
        let naming = TopicNaming::from(config);
        let mut routes = BTreeMap::new();
        for registration in registry.iter() {
            let route = naming.route(registration);
            bus.ensure_topic(&route.topic, config.partitions, config.replication_factor)
                .await?;
            bus.register_producer(&route.producer, &route.topic).await?;
            for executor in registration.executors() {
                bus.register_consumer(executor, &route.topic, &route.consumer_group)
                    .await?;
            }
            info!(
                task_type = %route.task_type,
                topic = %route.topic,
                consumer_group = %route.consumer_group,
                executors = registration.executors().len(),
                "task route composed"
            );
            routes.insert(route.task_type.clone(), route);
        }
        Ok(Self {
            bus,
            registry,
            routes,
        })
    }

    /// Returns the route composed for `task_type`.
    #[must_use]
    pub fn route(&self, task_type: &TaskTypeName) -> Option<&TaskRoute> {
        self.routes.get(task_type)
    }

    /// Iterates composed routes in type-name order.
    pub fn routes(&self) -> impl Iterator<Item = &TaskRoute> {
        self.routes.values()
    }
}

#[async_trait]
impl<B> TaskDispatch for TaskDispatcher<B>
where
    B: MessageBus,
{
    async fn dispatch(&self, task: &Task) -> Result<(), DispatchError> {
        let unrouted = || DispatchError::UnroutedType(task.task_type().clone());
        let route = self.route(task.task_type()).ok_or_else(unrouted)?;
        let registration = self.registry.get(task.task_type()).ok_or_else(unrouted)?;

        let key = registration.event_key(task);
        let payload =
            serde_json::to_vec(&TaskEvent::from(task)).map_err(|source| DispatchError::Encode {
                task_id: task.id(),
                source,
            })?;

        match self.bus.produce(&route.topic, &key, &payload).await? {
            Acknowledgement::Persisted => {
                debug!(task_id = %task.id(), topic = %route.topic, key, "task event published");
                Ok(())
            }
            Acknowledgement::NotPersisted => Err(DispatchError::NotPersisted {
                task_id: task.id(),
                topic: route.topic.clone(),
            }),
        }
    }
}
