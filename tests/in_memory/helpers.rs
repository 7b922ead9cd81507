//! Shared fixtures for in-memory engine integration tests.

use mockable::DefaultClock;
use rstest::fixture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tasklane::config::BusConfig;
use tasklane::task::{
    adapters::memory::{InMemoryMessageBus, InMemoryTaskStore},
    domain::{TaskKind, TaskTypeRegistration, TaskTypeRegistry},
    services::{TaskDispatcher, TaskManager},
};

/// Configuration of the `Sample` task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Input value.
    pub x: i64,
}

/// Result of the `Sample` task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleOutput {
    /// Output value.
    pub y: i64,
}

/// Task kind used by every integration scenario.
pub struct Sample;

impl TaskKind for Sample {
    const TYPE_NAME: &'static str = "Sample";
    type Config = SampleConfig;
    type Output = SampleOutput;
}

/// Dispatcher over the in-memory bus.
pub type MemoryDispatcher = TaskDispatcher<InMemoryMessageBus>;

/// Manager over the in-memory adapters.
pub type MemoryManager = TaskManager<InMemoryTaskStore, MemoryDispatcher>;

/// In-memory adapters wired into a manager.
pub struct Engine {
    /// Shared task store.
    pub store: Arc<InMemoryTaskStore>,
    /// Shared message bus.
    pub bus: Arc<InMemoryMessageBus>,
    /// Dispatcher composed over `bus`.
    pub dispatcher: Arc<MemoryDispatcher>,
    /// Manager using `store` and `dispatcher`.
    pub manager: MemoryManager,
}

/// Provides the wall clock.
#[fixture]
pub fn clock() -> DefaultClock {
    DefaultClock
}

/// Builds a registry holding the `Sample` kind.
///
/// # Errors
///
/// Returns an error if the registration is rejected.
pub fn sample_registry() -> eyre::Result<Arc<TaskTypeRegistry>> {
    let registration = TaskTypeRegistration::of::<Sample>()?.with_executor("sample-worker");
    Ok(Arc::new(TaskTypeRegistry::new().with(registration)?))
}

/// Wires in-memory adapters into a manager.
///
/// # Errors
///
/// Returns an error if dispatcher composition fails.
pub async fn engine() -> eyre::Result<Engine> {
    let store = Arc::new(InMemoryTaskStore::new());
    let bus = Arc::new(InMemoryMessageBus::new());
    let registry = sample_registry()?;
    let dispatcher = Arc::new(
        TaskDispatcher::compose(Arc::clone(&bus), Arc::clone(&registry), &BusConfig::default())
            .await?,
    );
    let manager = TaskManager::new(Arc::clone(&store), Arc::clone(&dispatcher), registry);
    Ok(Engine {
        store,
        bus,
        dispatcher,
        manager,
    })
}
