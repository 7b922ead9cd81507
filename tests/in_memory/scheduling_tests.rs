//! Scheduler cycles feeding the manager through in-memory adapters.

use super::helpers::{clock, engine, Sample, SampleConfig};
use async_trait::async_trait;
use eyre::ensure;
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasklane::config::SchedulerConfig;
use tasklane::task::{
    adapters::memory::InMemoryLockTable,
    domain::{Task, TaskFilter, TaskStatus, TaskTypeName},
    ports::TaskStore,
    services::{
        BackgroundLoops, BatchSourceError, CycleOutcome, EnableSwitches, Schedule,
        SchedulerSettings, TaskBatchSource, TaskScheduler,
    },
};

/// Emits one `Sample` task per cycle with an increasing input.
struct Counter {
    next: AtomicI64,
}

#[async_trait]
impl TaskBatchSource for Counter {
    async fn next_batch(&self) -> Result<Vec<Task>, BatchSourceError> {
        let x = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Task::of::<Sample>(&SampleConfig { x }, &DefaultClock)?])
    }
}

fn settings(seconds: u64) -> eyre::Result<SchedulerSettings> {
    Ok(SchedulerSettings::new(
        TaskTypeName::new("Sample")?,
        Schedule::Interval(Duration::from_secs(seconds)),
    )
    .with_lock_poll(Duration::from_millis(10)))
}

#[rstest]
#[tokio::test]
async fn disabled_type_skips_generation(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    let mut config = SchedulerConfig::default();
    config.type_enabled.insert("Sample".to_owned(), false);
    let switches = EnableSwitches::from_config(&config);
    let scheduler = TaskScheduler::new(
        settings(60)?,
        Arc::new(Counter {
            next: AtomicI64::new(0),
        }),
        engine.manager.clone(),
        Arc::new(InMemoryLockTable::new()),
        switches.clone(),
        Arc::new(clock),
    );

    ensure!(scheduler.run_cycle().await? == CycleOutcome::Disabled, "cycle should skip");
    switches.set_type(&TaskTypeName::new("Sample")?, true);
    ensure!(
        scheduler.run_cycle().await? == CycleOutcome::Completed { started: 1, failed: 0 },
        "cycle should run once re-enabled"
    );
    ensure!(engine.bus.published("Sample")?.len() == 1, "one event expected");
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn interval_scheduler_runs_until_shutdown(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    let lock = Arc::new(InMemoryLockTable::new());
    let mut loops = BackgroundLoops::new();
    loops.spawn_scheduler(TaskScheduler::new(
        settings(10)?,
        Arc::new(Counter {
            next: AtomicI64::new(0),
        }),
        engine.manager.clone(),
        lock,
        EnableSwitches::new(),
        Arc::new(clock),
    ));

    tokio::time::sleep(Duration::from_secs(25)).await;
    loops.shutdown().await;

    let waiting = engine
        .store
        .get_all(&TaskFilter::new().with_statuses([TaskStatus::Wait]))
        .await?;
    ensure!(waiting.total == 2, "expected two cycles, saw {}", waiting.total);
    let mut inputs: Vec<i64> = waiting
        .items
        .iter()
        .map(|task| task.config_as::<Sample>().map(|config| config.x))
        .collect::<Result<_, _>>()?;
    inputs.sort_unstable();
    ensure!(inputs == vec![0, 1], "each cycle should generate one task");
    Ok(())
}
