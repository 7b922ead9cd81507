//! Lease exclusivity and expiry through `PostgresLockTable`.

use crate::postgres::helpers::{prepare, test_runtime};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use std::time::Duration;
use tasklane::task::{
    adapters::postgres::PostgresLockTable,
    ports::{DistributedLock, LockLease},
};
use uuid::Uuid;

const LONG_TTL: Duration = Duration::from_secs(60);

#[rstest]
fn lease_is_exclusive_until_its_holder_releases_it(shared_test_cluster: &'static TestCluster) {
    let prepared = prepare(shared_test_cluster, "lock_exclusive").expect("database setup");
    let rt = test_runtime();
    let first = PostgresLockTable::new(prepared.pool.clone());
    let second = PostgresLockTable::new(prepared.pool.clone());

    let lease = rt
        .block_on(first.try_acquire("Sample", LONG_TTL))
        .expect("backend ok")
        .expect("free lock is granted");
    assert!(rt
        .block_on(second.try_acquire("Sample", LONG_TTL))
        .expect("backend ok")
        .is_none());
    assert!(rt
        .block_on(second.try_acquire("Report", LONG_TTL))
        .expect("backend ok")
        .is_some());

    let foreign = LockLease::new("Sample", Uuid::new_v4(), lease.expires_at());
    rt.block_on(second.release(&foreign)).expect("release succeeds");
    assert!(rt
        .block_on(second.try_acquire("Sample", LONG_TTL))
        .expect("backend ok")
        .is_none());

    rt.block_on(first.release(&lease)).expect("release succeeds");
    assert!(rt
        .block_on(second.try_acquire("Sample", LONG_TTL))
        .expect("backend ok")
        .is_some());
}

#[rstest]
fn expired_lease_is_taken_over_and_the_old_holder_cannot_free_it(
    shared_test_cluster: &'static TestCluster,
) {
    let prepared = prepare(shared_test_cluster, "lock_expiry").expect("database setup");
    let rt = test_runtime();
    let stalled = PostgresLockTable::new(prepared.pool.clone());
    let successor = PostgresLockTable::new(prepared.pool.clone());

    let stale = rt
        .block_on(stalled.try_acquire("Sample", Duration::from_millis(200)))
        .expect("backend ok")
        .expect("free lock is granted");
    std::thread::sleep(Duration::from_millis(500));
    let taken = rt
        .block_on(successor.try_acquire("Sample", LONG_TTL))
        .expect("backend ok")
        .expect("expired lease is taken over");

    assert_ne!(taken.token(), stale.token());
    assert!(taken.expires_at() > stale.expires_at());
    rt.block_on(stalled.release(&stale)).expect("release succeeds");
    assert!(rt
        .block_on(stalled.try_acquire("Sample", LONG_TTL))
        .expect("backend ok")
        .is_none());
}
