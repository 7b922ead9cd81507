//! In-memory adapters for tests and single-instance deployments.

mod bus;
mod lock;
mod store;

pub use bus::{ConsumerRegistration, InMemoryMessageBus, PublishedMessage, TopicSpec};
pub use lock::InMemoryLockTable;
pub use store::InMemoryTaskStore;
