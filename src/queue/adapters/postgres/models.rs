//! Diesel row models for queued deliveries.

use diesel::QueryableByName;
use diesel::sql_types::{BigInt, Integer, Nullable, Text, Uuid};

/// A delivery row as returned by lease, reap, and dead-letter queries.
#[derive(Debug, Clone, QueryableByName)]
pub struct DeliveryRow {
    /// Delivery identifier.
    #[diesel(sql_type = Uuid)]
    pub id: uuid::Uuid,
    /// Task the event targets.
    #[diesel(sql_type = Uuid)]
    pub task_id: uuid::Uuid,
    /// Target status.
    #[diesel(sql_type = Text)]
    pub status: String,
    /// Task revision the event was derived from.
    #[diesel(sql_type = BigInt)]
    pub revision: i64,
    /// Deliveries attempted so far.
    #[diesel(sql_type = Integer)]
    pub attempts: i32,
    /// Attempt budget recorded at enqueue time.
    #[diesel(sql_type = Integer)]
    pub max_attempts: i32,
    /// Failure reported by the most recent attempt.
    #[diesel(sql_type = Nullable<Text>)]
    pub last_error: Option<String>,
}

/// Per-bucket delivery count.
#[derive(Debug, Clone, QueryableByName)]
pub struct BucketCountRow {
    /// Bucket name: `queued`, `retry_scheduled`, `leased`, or `dead`.
    #[diesel(sql_type = Text)]
    pub bucket: String,
    /// Deliveries in the bucket.
    #[diesel(sql_type = BigInt)]
    pub total: i64,
}
