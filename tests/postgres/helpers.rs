//! Shared helpers for `PostgreSQL` integration tests.

use chrono::{DateTime, Local, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::Clock;
use pg_embedded_setup_unpriv::TestCluster;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tasklane::task::{
    adapters::postgres::{PostgresTaskStore, TaskPgPool},
    domain::{Task, TaskKind, TaskTypeName},
};
use tokio::runtime::Runtime;

/// Boxed error used by setup helpers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// SQL creating the task and lock tables.
pub const CREATE_TASKS_SQL: &str =
    include_str!("../../migrations/2026-03-01-000000_create_tasks/up.sql");

/// Template database name for the pre-migrated schema.
pub const TEMPLATE_DB: &str = "tasklane_test_template";

/// Configuration of the `Sample` task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Input value.
    pub x: i64,
}

/// Result of the `Sample` task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleOutput {
    /// Output value.
    pub y: i64,
}

/// Task kind stored by every scenario.
pub struct Sample;

impl TaskKind for Sample {
    const TYPE_NAME: &'static str = "Sample";
    type Config = SampleConfig;
    type Output = SampleOutput;
}

/// Clock that only moves when told to.
///
/// Instants carry whole seconds so they survive the microsecond precision of
/// `timestamptz` unchanged.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Starts the clock at a fixed instant.
    #[must_use]
    pub fn pinned() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid fixed instant");
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += delta;
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a current-thread runtime for driving async adapters.
#[must_use]
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create test runtime")
}

/// Builds a task type name known to be valid.
#[must_use]
pub fn type_name(name: &str) -> TaskTypeName {
    TaskTypeName::new(name).expect("valid type name")
}

/// Creates a waiting `Sample` task with input `x`.
#[must_use]
pub fn sample(clock: &ManualClock, x: i64) -> Task {
    Task::of::<Sample>(&SampleConfig { x }, clock).expect("valid task")
}

/// Ensures the template database exists with the schema applied.
///
/// # Errors
///
/// Returns an error if template creation or migration fails.
pub fn ensure_template(cluster: &TestCluster) -> Result<(), BoxError> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            conn.batch_execute(CREATE_TASKS_SQL)
                .map_err(|e| eyre::eyre!("{e}"))?;
            Ok(())
        })
        .map_err(|e| Box::new(e) as BoxError)?;
    Ok(())
}

/// Drops a test database when the test ends, even on panic.
pub struct CleanupGuard {
    cluster: &'static TestCluster,
    db_name: String,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Err(e) = self.cluster.drop_database(self.db_name.as_str()) {
            eprintln!("Warning: failed to drop test database {}: {e}", self.db_name);
        }
    }
}

/// Migrated database private to one test, with a store over it.
///
/// Fields drop in declaration order, so the pool closes its connections
/// before the guard drops the database.
pub struct PreparedStore {
    /// Store under test.
    pub store: PostgresTaskStore,
    /// Pool shared by the store and any lock table.
    pub pool: TaskPgPool,
    _guard: CleanupGuard,
}

/// Creates a database from the template and a store over it.
///
/// # Errors
///
/// Returns an error if template setup, database creation or pool
/// construction fails.
pub fn prepare(cluster: &'static TestCluster, prefix: &str) -> Result<PreparedStore, BoxError> {
    ensure_template(cluster)?;
    let db_name = format!("{prefix}_{}", uuid::Uuid::new_v4().simple());
    cluster
        .create_database_from_template(db_name.as_str(), TEMPLATE_DB)
        .map_err(|e| Box::new(e) as BoxError)?;
    let guard = CleanupGuard {
        cluster,
        db_name: db_name.clone(),
    };
    let url = cluster.connection().database_url(&db_name);
    let pool = Pool::builder()
        .max_size(2)
        .build(ConnectionManager::<PgConnection>::new(url))
        .map_err(|e| Box::new(e) as BoxError)?;
    Ok(PreparedStore {
        store: PostgresTaskStore::new(pool.clone()),
        pool,
        _guard: guard,
    })
}
