//! Diesel schema for task lifecycle persistence.

diesel::table! {
    /// Task records of every type, discriminated by `task_type`.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Type discriminator.
        #[max_length = 255]
        task_type -> Varchar,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Creation timestamp.
        date_added -> Timestamptz,
        /// Latest modification timestamp.
        date_updated -> Timestamptz,
        /// Latest executor heartbeat.
        last_activity_date -> Nullable<Timestamptz>,
        /// Execution start.
        execute_date_start -> Nullable<Timestamptz>,
        /// Execution end.
        execute_date_end -> Nullable<Timestamptz>,
        /// Parent task back-reference.
        parent_id -> Nullable<Uuid>,
        /// Attributed user.
        #[max_length = 255]
        user_id -> Nullable<Varchar>,
        /// Opaque input payload.
        config -> Jsonb,
        /// Opaque output payload.
        result -> Nullable<Jsonb>,
        /// Failure diagnostic.
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    /// Scheduler lock leases keyed by logical scheduler name.
    scheduler_locks (name) {
        /// Lock name.
        #[max_length = 255]
        name -> Varchar,
        /// Token of the current holder.
        holder -> Uuid,
        /// Lease expiry.
        expires_at -> Timestamptz,
    }
}
