//! Tasklane: distributed task lifecycle engine.
//!
//! Tasklane persists units of work, generates them on a recurring schedule
//! under a cross-instance lock, dispatches them to out-of-process executors
//! through a message bus, and recovers tasks that stop making progress.
//!
//! # Architecture
//!
//! Tasklane follows hexagonal architecture principles:
//!
//! - **Domain**: tasks, their status machine and the task type registry
//! - **Ports**: task store, message bus and distributed lock traits
//! - **Adapters**: in-memory, `PostgreSQL` and AMQP implementations
//! - **Services**: manager, dispatcher, schedulers and maintenance loops
//!
//! # Modules
//!
//! - [`task`]: the engine itself
//! - [`config`]: configuration loaded from JSON or `TASKLANE_*` variables
//! - [`telemetry`]: logging initialisation

pub mod config;
pub mod task;
pub mod telemetry;
