//! Stuck recovery and retention over a shared in-memory store.

use super::helpers::{clock, engine, Sample, SampleConfig};
use eyre::{ensure, eyre};
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tasklane::config::{StuckTaskConfig, StuckTaskPolicy};
use tasklane::task::{
    domain::{Task, TaskStatus},
    ports::TaskStore,
    services::{RetentionCleaner, RetentionPolicy, StuckTaskMonitor},
};

#[rstest]
#[tokio::test]
async fn fresh_tasks_are_not_stuck(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    engine
        .manager
        .run(Task::of::<Sample>(&SampleConfig { x: 1 }, &clock)?, None, None)
        .await?;
    let monitor = StuckTaskMonitor::new(
        Arc::clone(&engine.store),
        Arc::clone(&engine.dispatcher),
        Arc::new(clock),
        StuckTaskConfig::default(),
    );

    let report = monitor.scan().await?;

    ensure!(report.found == 0, "no task should be stuck yet");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn zero_timeouts_fail_running_work(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    let mut task = engine
        .manager
        .run(Task::of::<Sample>(&SampleConfig { x: 1 }, &clock)?, None, None)
        .await?;
    task.start(&clock)?;
    engine.store.update(&task).await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let monitor = StuckTaskMonitor::new(
        Arc::clone(&engine.store),
        Arc::clone(&engine.dispatcher),
        Arc::new(clock),
        StuckTaskConfig {
            inactivity_timeout_secs: 0,
            policy: StuckTaskPolicy::Fail,
            ..StuckTaskConfig::default()
        },
    );

    let report = monitor.scan().await?;

    let failed = engine
        .store
        .find_by_id(task.id())
        .await?
        .ok_or_else(|| eyre!("task disappeared"))?;
    ensure!(report.failed == 1, "one task should be failed");
    ensure!(failed.status() == TaskStatus::Fails, "task should be failed");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn retention_keeps_recent_finished_tasks(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    let mut task = engine
        .manager
        .run(Task::of::<Sample>(&SampleConfig { x: 1 }, &clock)?, None, None)
        .await?;
    task.start(&clock)?;
    task.complete(TaskStatus::Success, serde_json::json!({ "y": 2 }), &clock)?;
    engine.store.update(&task).await?;
    let cleaner = RetentionCleaner::new(
        Arc::clone(&engine.store),
        Arc::new(clock),
        RetentionPolicy::new(Some(30)),
        Duration::from_secs(86_400),
    );

    ensure!(cleaner.purge().await? == 0, "recent tasks must survive");
    ensure!(engine.store.len()? == 1, "store should keep the task");
    Ok(())
}
