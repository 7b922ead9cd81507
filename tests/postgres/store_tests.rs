//! Persistence, filtered lookup and batch writes through `PostgresTaskStore`.

use crate::postgres::helpers::{
    ManualClock, Sample, SampleOutput, prepare, sample, test_runtime, type_name,
};
use chrono::Duration as Age;
use mockable::Clock;
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use serde_json::json;
use tasklane::task::{
    domain::{Task, TaskFilter, TaskId, TaskStatus, UserId},
    ports::{TaskStore, TaskStoreError},
};

#[rstest]
fn finished_task_reads_back_unchanged(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "store_round_trip").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    let mut task = sample(&clock, 1);
    task.assign_lineage(
        Some(TaskId::new()),
        Some(UserId::new("alice").expect("valid user")),
    );
    rt.block_on(prepared.store.add(&task)).expect("add succeeds");

    clock.advance(Age::seconds(5));
    task.start(&clock).expect("waiting task starts");
    clock.advance(Age::seconds(5));
    task.complete_with::<Sample>(TaskStatus::Success, &SampleOutput { y: 2 }, &clock)
        .expect("running task completes");
    rt.block_on(prepared.store.update(&task))
        .expect("update succeeds");

    let stored = rt
        .block_on(prepared.store.find_by_id(task.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(stored, task);
    assert_eq!(
        stored.result_as::<Sample>().expect("typed result"),
        Some(SampleOutput { y: 2 })
    );
}

#[rstest]
fn duplicate_ids_and_missing_rows_are_reported(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "store_errors").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    let task = sample(&clock, 1);
    rt.block_on(prepared.store.add(&task)).expect("first add succeeds");

    let duplicate = rt.block_on(prepared.store.add(&task));
    let unknown = sample(&clock, 2);
    let missing = rt.block_on(prepared.store.update(&unknown));

    assert!(matches!(duplicate, Err(TaskStoreError::DuplicateTask(id)) if id == task.id()));
    assert!(matches!(missing, Err(TaskStoreError::NotFound(id)) if id == unknown.id()));
}

#[rstest]
fn filters_combine_status_type_age_and_limit(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "store_filters").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    let old_sample = sample(&clock, 1);
    let old_foo = Task::new(type_name("Foo"), json!({}), &clock);
    let cutoff = clock.utc() + Age::hours(1);
    clock.advance(Age::hours(1));
    let young_sample = sample(&clock, 2);
    let mut running = sample(&clock, 3);
    running.start(&clock).expect("waiting task starts");
    for task in [&old_sample, &old_foo, &young_sample, &running] {
        rt.block_on(prepared.store.add(task)).expect("add succeeds");
    }

    let waiting_samples = rt
        .block_on(
            prepared.store.get_all(
                &TaskFilter::new()
                    .with_statuses([TaskStatus::Wait])
                    .including_types([type_name("Sample")]),
            ),
        )
        .expect("query succeeds");
    let not_foo = rt
        .block_on(
            prepared
                .store
                .get_all(&TaskFilter::new().excluding_types([type_name("Foo")])),
        )
        .expect("query succeeds");
    let strictly_older = rt
        .block_on(prepared.store.get_all(&TaskFilter::new().added_before(cutoff)))
        .expect("query succeeds");
    let first_two = rt
        .block_on(prepared.store.get_all(&TaskFilter::new().with_limit(2)))
        .expect("query succeeds");

    let ids = |tasks: &[Task]| tasks.iter().map(Task::id).collect::<Vec<_>>();
    assert_eq!(
        ids(&waiting_samples.items),
        vec![old_sample.id(), young_sample.id()]
    );
    assert_eq!(not_foo.total, 3);
    assert!(not_foo.items.iter().all(|task| task.task_type().as_str() == "Sample"));
    assert_eq!(strictly_older.total, 2);
    assert!(!ids(&strictly_older.items).contains(&young_sample.id()));
    assert_eq!((first_two.items.len(), first_two.total), (2, 4));
}

#[rstest]
fn inactivity_filter_only_matches_stale_heartbeats(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "store_activity").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    let mut stale = sample(&clock, 1);
    stale.start(&clock).expect("waiting task starts");
    let waiting = sample(&clock, 2);
    clock.advance(Age::minutes(30));
    let mut fresh = sample(&clock, 3);
    fresh.start(&clock).expect("waiting task starts");
    for task in [&stale, &waiting, &fresh] {
        rt.block_on(prepared.store.add(task)).expect("add succeeds");
    }

    let page = rt
        .block_on(
            prepared
                .store
                .get_all(&TaskFilter::new().last_activity_before(clock.utc() - Age::minutes(10))),
        )
        .expect("query succeeds");

    assert_eq!(
        page.items.iter().map(Task::id).collect::<Vec<_>>(),
        vec![stale.id()]
    );
}

#[rstest]
fn update_batch_rolls_back_when_a_task_is_missing(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "store_batch").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    let mut stored = sample(&clock, 1);
    rt.block_on(prepared.store.add(&stored)).expect("add succeeds");
    let mut missing = sample(&clock, 2);

    stored.fail("stuck", &clock).expect("waiting task can fail");
    missing.fail("stuck", &clock).expect("waiting task can fail");
    let result = rt.block_on(
        prepared
            .store
            .update_batch(&[stored.clone(), missing.clone()]),
    );

    assert!(matches!(result, Err(TaskStoreError::NotFound(id)) if id == missing.id()));
    let reloaded = rt
        .block_on(prepared.store.find_by_id(stored.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(reloaded.status(), TaskStatus::Wait);
}

#[rstest]
fn guarded_batch_leaves_rows_that_moved_on(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "store_guarded").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    let mut unchanged = sample(&clock, 1);
    let mut finished = sample(&clock, 2);
    unchanged.start(&clock).expect("waiting task starts");
    finished.start(&clock).expect("waiting task starts");
    rt.block_on(prepared.store.add(&unchanged)).expect("add succeeds");
    rt.block_on(prepared.store.add(&finished)).expect("add succeeds");

    let mut executor_copy = finished.clone();
    executor_copy
        .complete_with::<Sample>(TaskStatus::Success, &SampleOutput { y: 2 }, &clock)
        .expect("running task completes");
    rt.block_on(prepared.store.update(&executor_copy))
        .expect("update succeeds");

    unchanged.fail("stuck", &clock).expect("running task can fail");
    finished.fail("stuck", &clock).expect("running task can fail");
    let written = rt
        .block_on(prepared.store.update_batch_if_status(&[
            (unchanged.clone(), TaskStatus::InProgress),
            (finished.clone(), TaskStatus::InProgress),
        ]))
        .expect("guarded batch succeeds");

    assert_eq!(written, vec![unchanged.id()]);
    let kept = rt
        .block_on(prepared.store.find_by_id(finished.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(kept, executor_copy);
}

#[rstest]
fn bulk_delete_matches_the_filter_and_ignores_the_limit(
    shared_test_cluster: &'static TestCluster,
) {
    let prepared = prepare(shared_test_cluster, "store_bulk").expect("database setup");
    let rt = test_runtime();
    let clock = ManualClock::pinned();
    for x in 0..3 {
        rt.block_on(prepared.store.add(&sample(&clock, x)))
            .expect("add succeeds");
    }
    let foo = Task::new(type_name("Foo"), json!({}), &clock);
    rt.block_on(prepared.store.add(&foo)).expect("add succeeds");

    assert!(prepared.store.supports_bulk_delete());
    let removed = rt
        .block_on(prepared.store.bulk_delete(
            &TaskFilter::new()
                .including_types([type_name("Sample")])
                .with_limit(1),
        ))
        .expect("bulk delete succeeds");

    assert_eq!(removed, 3);
    let left = rt
        .block_on(prepared.store.get_all(&TaskFilter::new()))
        .expect("query succeeds");
    assert_eq!(
        left.items.iter().map(Task::id).collect::<Vec<_>>(),
        vec![foo.id()]
    );
}
