//! Spawning and stopping the long-lived service loops.

use super::dispatcher::TaskDispatch;
use super::maintenance::{RetentionCleaner, StuckTaskMonitor};
use super::scheduler::TaskScheduler;
use crate::task::ports::TaskStore;
use mockable::Clock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Independent loops sharing one shutdown signal.
///
/// Every loop runs on its own Tokio task with a child token, so a slow loop
/// never delays another one.
#[derive(Debug, Default)]
pub struct BackgroundLoops {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundLoops {
    /// Creates an empty set of loops.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token that stops every loop when cancelled.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the number of spawned loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` when no loop was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Spawns a scheduler loop.
    pub fn spawn_scheduler<S, D, C>(&mut self, scheduler: TaskScheduler<S, D, C>)
    where
        S: TaskStore + 'static,
        D: TaskDispatch + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let token = self.cancel.child_token();
        self.handles.push(tokio::spawn(scheduler.run(token)));
    }

    /// Spawns the stuck-task monitor.
    pub fn spawn_stuck_monitor<S, D, C>(&mut self, monitor: StuckTaskMonitor<S, D, C>)
    where
        S: TaskStore + 'static,
        D: TaskDispatch + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let token = self.cancel.child_token();
        self.handles.push(tokio::spawn(monitor.run(token)));
    }

    /// Spawns the retention cleaner.
    pub fn spawn_retention<S, C>(&mut self, cleaner: RetentionCleaner<S, C>)
    where
        S: TaskStore + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let token = self.cancel.child_token();
        self.handles.push(tokio::spawn(cleaner.run(token)));
    }

    /// Cancels every loop and waits for each to finish its current cycle.
    pub async fn shutdown(self) {
        info!(loops = self.handles.len(), "stopping background loops");
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "background loop terminated abnormally");
            }
        }
    }
}
