//! `PostgreSQL` lease table implementing the distributed lock port.

use super::{schema::scheduler_locks, store::TaskPgPool};
use crate::task::ports::{DistributedLock, LockError, LockLease, LockResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Double, Text, Timestamptz, Uuid as SqlUuid};
use std::time::Duration;
use uuid::Uuid;

/// Lock table stored in `scheduler_locks`, shared by every instance that
/// points at the same database.
///
/// A lease row is taken over only once its `expires_at` has passed, so a
/// crashed or hung holder blocks the name for at most one TTL. Expiry is
/// computed and compared by the database clock alone, so skew between hosts
/// cannot shorten a live lease.
#[derive(Debug, Clone)]
pub struct PostgresLockTable {
    pool: TaskPgPool,
}

#[derive(QueryableByName)]
struct GrantedLease {
    #[diesel(sql_type = Timestamptz)]
    expires_at: DateTime<Utc>,
}

impl PostgresLockTable {
    /// Creates a lock table over `pool`.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> LockResult<T>
    where
        F: FnOnce(&mut PgConnection) -> LockResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(LockError::backend)?;
            f(&mut connection)
        })
        .await
        .map_err(LockError::backend)?
    }
}

#[async_trait]
impl DistributedLock for PostgresLockTable {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> LockResult<Option<LockLease>> {
        chrono::Duration::from_std(ttl).map_err(|_| LockError::InvalidTtl(ttl))?;
        let ttl_secs = ttl.as_secs_f64();
        let token = Uuid::new_v4();
        let lock_name = name.to_owned();

        let granted = self
            .run_blocking(move |connection| {
                diesel::sql_query(concat!(
                    "INSERT INTO scheduler_locks (name, holder, expires_at) ",
                    "VALUES ($1, $2, now() + make_interval(secs => $3)) ",
                    "ON CONFLICT (name) DO UPDATE ",
                    "SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at ",
                    "WHERE scheduler_locks.expires_at <= now() ",
                    "RETURNING expires_at",
                ))
                .bind::<Text, _>(lock_name)
                .bind::<SqlUuid, _>(token)
                .bind::<Double, _>(ttl_secs)
                .load::<GrantedLease>(connection)
                .map_err(LockError::backend)
            })
            .await?;

        Ok(granted
            .into_iter()
            .next()
            .map(|lease| LockLease::new(name, token, lease.expires_at)))
    }

    async fn release(&self, lease: &LockLease) -> LockResult<()> {
        let name = lease.name().to_owned();
        let token = lease.token();
        self.run_blocking(move |connection| {
            diesel::delete(
                scheduler_locks::table
                    .filter(scheduler_locks::name.eq(name))
                    .filter(scheduler_locks::holder.eq(token)),
            )
            .execute(connection)
            .map_err(LockError::backend)?;
            Ok(())
        })
        .await
    }
}
