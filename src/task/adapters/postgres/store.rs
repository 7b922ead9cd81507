//! `PostgreSQL` task store implementation.

use super::{models::TaskRow, schema::tasks};
use crate::task::{
    domain::{
        PersistedTaskData, Task, TaskFilter, TaskId, TaskStatus, TaskTypeName, UserId,
    },
    ports::{TaskPage, TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store.
///
/// Supports bulk deletion through a single conditional `DELETE`.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn add(&self, task: &Task) -> TaskStoreResult<Task> {
        let task_id = task.id();
        let row = to_row(task);
        self.run_blocking(move |connection| {
            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskStoreError::DuplicateTask(task_id)
                    }
                    _ => TaskStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await?;
        Ok(task.clone())
    }

    async fn get_all(&self, filter: &TaskFilter) -> TaskStoreResult<TaskPage> {
        let owned_filter = filter.clone();
        self.run_blocking(move |connection| {
            let row_count = filtered(&owned_filter)
                .count()
                .get_result::<i64>(connection)
                .map_err(TaskStoreError::persistence)?;
            let mut query =
                filtered(&owned_filter).order((tasks::date_added.asc(), tasks::id.asc()));
            if let Some(limit) = owned_filter.limit() {
                query = query.limit(i64::try_from(limit).map_err(TaskStoreError::persistence)?);
            }
            let rows = query
                .load::<TaskRow>(connection)
                .map_err(TaskStoreError::persistence)?;
            let items = rows
                .into_iter()
                .map(row_to_task)
                .collect::<TaskStoreResult<Vec<_>>>()?;
            let total = usize::try_from(row_count).map_err(TaskStoreError::persistence)?;
            Ok(TaskPage { items, total })
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .find(id.into_inner())
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn update(&self, task: &Task) -> TaskStoreResult<()> {
        let task_id = task.id();
        let row = to_row(task);
        self.run_blocking(move |connection| update_row(connection, task_id, &row))
            .await
    }

    async fn update_batch(&self, batch: &[Task]) -> TaskStoreResult<()> {
        let rows: Vec<(TaskId, TaskRow)> =
            batch.iter().map(|task| (task.id(), to_row(task))).collect();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|transaction| {
                for (task_id, row) in &rows {
                    update_row(transaction, *task_id, row)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn update_batch_if_status(
        &self,
        batch: &[(Task, TaskStatus)],
    ) -> TaskStoreResult<Vec<TaskId>> {
        let rows: Vec<(TaskId, TaskStatus, TaskRow)> = batch
            .iter()
            .map(|(task, expected)| (task.id(), *expected, to_row(task)))
            .collect();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|transaction| {
                let mut written = Vec::with_capacity(rows.len());
                for (task_id, expected, row) in &rows {
                    let updated = diesel::update(
                        tasks::table
                            .find(task_id.into_inner())
                            .filter(tasks::status.eq(expected.as_str())),
                    )
                    .set(row)
                    .execute(transaction)
                    .map_err(TaskStoreError::persistence)?;
                    if updated == 1 {
                        written.push(*task_id);
                    }
                }
                Ok(written)
            })
        })
        .await
    }

    async fn delete(&self, ids: &[TaskId]) -> TaskStoreResult<usize> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            diesel::delete(tasks::table.filter(tasks::id.eq_any(uuids)))
                .execute(connection)
                .map_err(TaskStoreError::persistence)
        })
        .await
    }

    fn supports_bulk_delete(&self) -> bool {
        true
    }

    async fn bulk_delete(&self, filter: &TaskFilter) -> TaskStoreResult<usize> {
        let owned_filter = filter.clone();
        self.run_blocking(move |connection| {
            let matching_ids = filtered(&owned_filter).select(tasks::id);
            diesel::delete(tasks::table.filter(tasks::id.eq_any(matching_ids)))
                .execute(connection)
                .map_err(TaskStoreError::persistence)
        })
        .await
    }
}

/// Translates a [`TaskFilter`] into a boxed query. The limit is applied by
/// callers that need it.
fn filtered(filter: &TaskFilter) -> tasks::BoxedQuery<'static, Pg> {
    let mut query = tasks::table.into_boxed();
    if !filter.statuses().is_empty() {
        let statuses: Vec<String> = filter
            .statuses()
            .iter()
            .map(|status| status.as_str().to_owned())
            .collect();
        query = query.filter(tasks::status.eq_any(statuses));
    }
    if !filter.include_types().is_empty() {
        query = query.filter(tasks::task_type.eq_any(type_names(filter.include_types())));
    }
    if !filter.exclude_types().is_empty() {
        query = query.filter(tasks::task_type.ne_all(type_names(filter.exclude_types())));
    }
    if let Some(cutoff) = filter.added_before_instant() {
        query = query.filter(tasks::date_added.lt(cutoff));
    }
    if let Some(cutoff) = filter.last_activity_before_instant() {
        query = query.filter(tasks::last_activity_date.lt(cutoff));
    }
    if let Some(parent_id) = filter.parent_id() {
        query = query.filter(tasks::parent_id.eq(parent_id.into_inner()));
    }
    query
}

fn type_names(types: &[TaskTypeName]) -> Vec<String> {
    types.iter().map(|name| name.as_str().to_owned()).collect()
}

fn update_row(
    connection: &mut PgConnection,
    task_id: TaskId,
    row: &TaskRow,
) -> TaskStoreResult<()> {
    let updated = diesel::update(tasks::table.find(task_id.into_inner()))
        .set(row)
        .execute(connection)
        .map_err(TaskStoreError::persistence)?;
    if updated == 0 {
        return Err(TaskStoreError::NotFound(task_id));
    }
    Ok(())
}

fn to_row(task: &Task) -> TaskRow {
    TaskRow {
        id: task.id().into_inner(),
        task_type: task.task_type().as_str().to_owned(),
        status: task.status().as_str().to_owned(),
        date_added: task.date_added(),
        date_updated: task.date_updated(),
        last_activity_date: task.last_activity_date(),
        execute_date_start: task.execute_date_start(),
        execute_date_end: task.execute_date_end(),
        parent_id: task.parent_id().map(TaskId::into_inner),
        user_id: task.user_id().map(|user| user.as_str().to_owned()),
        config: task.config().clone(),
        result: task.result().cloned(),
        error_message: task.error_message().map(str::to_owned),
    }
}

fn row_to_task(row: TaskRow) -> TaskStoreResult<Task> {
    let TaskRow {
        id,
        task_type,
        status,
        date_added,
        date_updated,
        last_activity_date,
        execute_date_start,
        execute_date_end,
        parent_id,
        user_id,
        config,
        result,
        error_message,
    } = row;

    let data = PersistedTaskData {
        id: TaskId::from_uuid(id),
        task_type: TaskTypeName::new(task_type).map_err(TaskStoreError::persistence)?,
        status: TaskStatus::try_from(status.as_str()).map_err(TaskStoreError::persistence)?,
        date_added,
        date_updated,
        last_activity_date,
        execute_date_start,
        execute_date_end,
        parent_id: parent_id.map(TaskId::from_uuid),
        user_id: user_id
            .map(UserId::new)
            .transpose()
            .map_err(TaskStoreError::persistence)?,
        config,
        result,
        error_message,
    };
    Ok(Task::from_persisted(data))
}
