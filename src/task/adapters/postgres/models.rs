//! Diesel row models for task persistence.

use super::schema::tasks;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct TaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Type discriminator.
    pub task_type: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation timestamp.
    pub date_added: DateTime<Utc>,
    /// Latest modification timestamp.
    pub date_updated: DateTime<Utc>,
    /// Latest executor heartbeat.
    pub last_activity_date: Option<DateTime<Utc>>,
    /// Execution start.
    pub execute_date_start: Option<DateTime<Utc>>,
    /// Execution end.
    pub execute_date_end: Option<DateTime<Utc>>,
    /// Parent task back-reference.
    pub parent_id: Option<uuid::Uuid>,
    /// Attributed user.
    pub user_id: Option<String>,
    /// Opaque input payload.
    pub config: Value,
    /// Opaque output payload.
    pub result: Option<Value>,
    /// Failure diagnostic.
    pub error_message: Option<String>,
}
