//! Application services of the task engine.
//!
//! The [`TaskManager`] persists and dispatches tasks through a
//! [`TaskDispatch`] implementation, normally the bus-backed
//! [`TaskDispatcher`]. [`TaskScheduler`] loops generate tasks under a named
//! lock, and the [`maintenance`] loops recover stuck tasks and purge old ones.

mod background;
mod dispatcher;
pub mod maintenance;
mod manager;
mod naming;
mod scheduler;

pub use background::BackgroundLoops;
pub use dispatcher::{DispatchError, TaskDispatch, TaskDispatcher, TaskEvent};
pub use maintenance::{
    MaintenanceError, RetentionCleaner, RetentionPolicy, StuckReason, StuckScanReport,
    StuckTaskMonitor,
};
pub use manager::{TaskManager, TaskRunError, TaskRunResult};
pub use naming::{TaskRoute, TopicNaming};
pub use scheduler::{
    BatchSourceError, CycleOutcome, DEFAULT_WATCHDOG, EnableSwitches, Schedule, SchedulerError,
    SchedulerSettings, TaskBatchSource, TaskScheduler,
};
