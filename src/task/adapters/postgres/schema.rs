//! Diesel schema for task persistence.

diesel::table! {
    /// Task records.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Task title.
        #[max_length = 255]
        title -> Varchar,
        /// Optional free-form description.
        description -> Nullable<Text>,
        /// Lifecycle status.
        #[max_length = 32]
        status -> Varchar,
        /// Priority.
        #[max_length = 32]
        priority -> Varchar,
        /// Optional due date.
        due_date -> Nullable<Timestamptz>,
        /// Owning user reference.
        owner_id -> Uuid,
        /// Monotonic write revision.
        revision -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last write timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Status-change events written alongside task mutations.
    task_status_outbox (id) {
        /// Outbox record identifier.
        id -> Uuid,
        /// Task the event refers to.
        task_id -> Uuid,
        /// Target status.
        #[max_length = 32]
        status -> Varchar,
        /// Task revision the event was derived from.
        revision -> Int8,
        /// When the event was recorded.
        created_at -> Timestamptz,
        /// When the relay published the event, if it has.
        published_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(task_status_outbox -> tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(tasks, task_status_outbox);
