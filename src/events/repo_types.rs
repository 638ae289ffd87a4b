use sqlx::FromRow;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

/// Event record in the database. Single-day events carry `date` plus an
/// optional start/end time; multi-day events additionally carry
/// `range_start`/`range_end`.
#[derive(Debug, Clone, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub date: Date,
    pub start_time: Option<Time>,
    pub end_time: Option<Time>,
    pub range_start: Option<Date>,
    pub range_end: Option<Date>,
    pub address: Option<String>,
    pub details: Option<String>,
    pub photo: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Validated payload for inserting or replacing an event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub date: Date,
    pub start_time: Option<Time>,
    pub end_time: Option<Time>,
    pub range_start: Option<Date>,
    pub range_end: Option<Date>,
    pub address: Option<String>,
    pub details: Option<String>,
    pub photo: Option<String>,
}
