//! Retention purges through `PostgresTaskStore`, on both purge paths.

use crate::postgres::helpers::{ManualClock, prepare, test_runtime, type_name};
use async_trait::async_trait;
use chrono::Duration as Age;
use mockable::Clock;
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tasklane::task::{
    adapters::postgres::PostgresTaskStore,
    domain::{Task, TaskFilter, TaskId, TaskStatus},
    ports::{TaskPage, TaskStore, TaskStoreResult},
    services::{RetentionCleaner, RetentionPolicy},
};
use tokio::runtime::Runtime;

/// `PostgresTaskStore` with bulk deletion hidden, forcing fetch-then-delete.
struct FetchThenDelete(PostgresTaskStore);

#[async_trait]
impl TaskStore for FetchThenDelete {
    async fn add(&self, task: &Task) -> TaskStoreResult<Task> {
        self.0.add(task).await
    }

    async fn get_all(&self, filter: &TaskFilter) -> TaskStoreResult<TaskPage> {
        self.0.get_all(filter).await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.0.find_by_id(id).await
    }

    async fn update(&self, task: &Task) -> TaskStoreResult<()> {
        self.0.update(task).await
    }

    async fn update_batch(&self, tasks: &[Task]) -> TaskStoreResult<()> {
        self.0.update_batch(tasks).await
    }

    async fn update_batch_if_status(
        &self,
        batch: &[(Task, TaskStatus)],
    ) -> TaskStoreResult<Vec<TaskId>> {
        self.0.update_batch_if_status(batch).await
    }

    async fn delete(&self, ids: &[TaskId]) -> TaskStoreResult<usize> {
        self.0.delete(ids).await
    }
}

/// Stores a finished task of `kind` created `days` before the clock.
fn finished_task<S: TaskStore>(
    rt: &Runtime,
    store: &S,
    clock: &ManualClock,
    kind: &str,
    days: i64,
) -> Task {
    let now = clock.utc();
    clock.set(now - Age::days(days));
    let mut task = Task::new(type_name(kind), json!({}), clock);
    task.start(clock).expect("waiting task starts");
    task.complete(TaskStatus::Success, json!({}), clock)
        .expect("running task completes");
    clock.set(now);
    rt.block_on(store.add(&task)).expect("add succeeds");
    task
}

fn purge_with_overrides<S: TaskStore>(rt: &Runtime, store: Arc<S>) {
    let clock = ManualClock::pinned();
    let old_foo = finished_task(rt, store.as_ref(), &clock, "Foo", 10);
    let young_foo = finished_task(rt, store.as_ref(), &clock, "Foo", 5);
    let old_sample = finished_task(rt, store.as_ref(), &clock, "Sample", 10);
    let ancient_sample = finished_task(rt, store.as_ref(), &clock, "Sample", 31);
    let now = clock.utc();
    clock.set(now - Age::days(60));
    let mut running = Task::new(type_name("Sample"), json!({}), &clock);
    running.start(&clock).expect("waiting task starts");
    clock.set(now);
    rt.block_on(store.add(&running)).expect("add succeeds");
    let cleaner = RetentionCleaner::new(
        Arc::clone(&store),
        Arc::new(clock.clone()),
        RetentionPolicy::new(Some(30)).with_override(type_name("Foo"), 7),
        Duration::from_secs(86_400),
    );

    let removed = rt.block_on(cleaner.purge()).expect("purge succeeds");

    assert_eq!(removed, 2);
    for (task, kept) in [
        (&old_foo, false),
        (&young_foo, true),
        (&old_sample, true),
        (&ancient_sample, false),
        (&running, true),
    ] {
        let present = rt
            .block_on(store.find_by_id(task.id()))
            .expect("lookup succeeds")
            .is_some();
        assert_eq!(present, kept, "{} task from {}", task.task_type(), task.date_added());
    }
}

#[rstest]
fn bulk_purge_applies_overrides_and_global_retention(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "retention_bulk").expect("database setup");
    let rt = test_runtime();
    purge_with_overrides(&rt, Arc::new(prepared.store.clone()));
}

#[rstest]
fn fetch_then_delete_purges_the_same_rows(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "retention_fetch").expect("database setup");
    let rt = test_runtime();
    let store = Arc::new(FetchThenDelete(prepared.store.clone()));
    assert!(!store.supports_bulk_delete());
    purge_with_overrides(&rt, store);
}
