use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub created_at: OffsetDateTime,
}

/// Single-use password-reset token row. The token string is the primary
/// key; the row is deleted the moment it is consumed.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
}

/// Partial update applied to a user record; `None` fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
}
