//! Port contracts for the task lifecycle engine.
//!
//! Ports define infrastructure-agnostic interfaces for the task store, the
//! message bus and the named distributed lock used by the services.

pub mod bus;
pub mod lock;
pub mod store;

pub use bus::{Acknowledgement, MessageBus, MessageBusError, MessageBusResult};
pub use lock::{acquire_within, DistributedLock, LockError, LockLease, LockResult};
pub use store::{TaskPage, TaskStore, TaskStoreError, TaskStoreResult};
