use sqlx::PgPool;
use uuid::Uuid;

use crate::events::repo_types::{Event, NewEvent};

impl Event {
    pub async fn list_by_user(
        db: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, user_id, title, date, start_time, end_time,
                   range_start, range_end, address, details, photo, created_at
            FROM events
            WHERE user_id = $1
            ORDER BY date ASC, start_time ASC NULLS LAST
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Ownership is part of the lookup key: another user's event behaves
    /// exactly like a missing one.
    pub async fn find(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, user_id, title, date, start_time, end_time,
                   range_start, range_end, address, details, photo, created_at
            FROM events
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn create(db: &PgPool, user_id: Uuid, event: NewEvent) -> anyhow::Result<Event> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events
                (user_id, title, date, start_time, end_time,
                 range_start, range_end, address, details, photo)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, title, date, start_time, end_time,
                      range_start, range_end, address, details, photo, created_at
            "#,
        )
        .bind(user_id)
        .bind(event.title)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.range_start)
        .bind(event.range_end)
        .bind(event.address)
        .bind(event.details)
        .bind(event.photo)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn replace(
        db: &PgPool,
        user_id: Uuid,
        id: Uuid,
        event: NewEvent,
    ) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET title = $3, date = $4, start_time = $5, end_time = $6,
                range_start = $7, range_end = $8, address = $9,
                details = $10, photo = $11
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, date, start_time, end_time,
                      range_start, range_end, address, details, photo, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(event.title)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.range_start)
        .bind(event.range_end)
        .bind(event.address)
        .bind(event.details)
        .bind(event.photo)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"DELETE FROM events WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
