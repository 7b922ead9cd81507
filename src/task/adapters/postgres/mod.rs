//! `PostgreSQL` adapters for task persistence and scheduler locking.

mod lock;
mod models;
mod schema;
mod store;

pub use lock::PostgresLockTable;
pub use store::{PostgresTaskStore, TaskPgPool};
