//! End-to-end lifecycle of a `Sample` task over in-memory adapters.

use super::helpers::{clock, engine, Sample, SampleConfig, SampleOutput};
use eyre::{ensure, eyre};
use mockable::DefaultClock;
use rstest::rstest;
use tasklane::task::{
    domain::{Task, TaskStatus, UserId},
    ports::TaskStore,
    services::TaskEvent,
};

#[rstest]
#[tokio::test]
async fn sample_task_runs_from_creation_to_success(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    let user = UserId::new("operator")?;

    let task = Task::of::<Sample>(&SampleConfig { x: 1 }, &clock)?;
    let started = engine.manager.run(task, None, Some(user.clone())).await?;

    let persisted = engine
        .manager
        .get_by_id(started.id())
        .await?
        .ok_or_else(|| eyre!("task was not persisted"))?;
    ensure!(persisted.status() == TaskStatus::Wait, "task should be waiting");
    ensure!(persisted.user_id() == Some(&user), "user should be attributed");

    let published = engine.bus.published("Sample")?;
    let message = published
        .first()
        .ok_or_else(|| eyre!("no event on the Sample topic"))?;
    let event: TaskEvent = serde_json::from_slice(&message.payload)?;
    ensure!(event.task_id == started.id(), "event should carry the task id");
    ensure!(message.key == started.id().to_string(), "event should be keyed by id");

    let mut running = engine
        .store
        .find_by_id(event.task_id)
        .await?
        .ok_or_else(|| eyre!("executor could not load the task"))?;
    let config = running.config_as::<Sample>()?;
    running.start(&clock)?;
    engine.store.update(&running).await?;
    running.complete_with::<Sample>(
        TaskStatus::Success,
        &SampleOutput { y: config.x + 1 },
        &clock,
    )?;
    engine.store.update(&running).await?;

    let finished = engine
        .manager
        .get_by_id(started.id())
        .await?
        .ok_or_else(|| eyre!("task disappeared"))?;
    ensure!(finished.status() == TaskStatus::Success, "task should succeed");
    ensure!(
        finished.result_as::<Sample>()? == Some(SampleOutput { y: 2 }),
        "result should round-trip"
    );
    ensure!(
        finished.execute_date_end() >= finished.execute_date_start(),
        "execution window should be ordered"
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn children_are_listed_under_their_parent(clock: DefaultClock) -> eyre::Result<()> {
    let engine = engine().await?;
    let parent = engine
        .manager
        .run(Task::of::<Sample>(&SampleConfig { x: 1 }, &clock)?, None, None)
        .await?;
    let child = engine
        .manager
        .run(
            Task::of::<Sample>(&SampleConfig { x: 2 }, &clock)?,
            Some(parent.id()),
            None,
        )
        .await?;

    let children = engine.manager.get_children(parent.id()).await?;
    let loaded_parent = engine.manager.get_parent(&child).await?;

    ensure!(children == vec![child], "only the child should be listed");
    ensure!(loaded_parent == Some(parent), "child should resolve its parent");
    Ok(())
}
