use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{PasswordResetToken, User, UserChanges};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailTaken,
    #[error("reset token already exists")]
    TokenExists,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence seam for the auth flows. The production implementation is
/// Postgres-backed; tests substitute an in-memory fake.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<(), StoreError>;
    /// Returns false when no such user existed. Owned events and reset
    /// tokens are removed by the database's cascade rules.
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn create_reset_token(&self, user_id: Uuid, token: &str) -> Result<(), StoreError>;
    /// Atomically remove and return the token row. At most one concurrent
    /// caller can receive `Some` for a given token.
    async fn consume_reset_token(&self, token: &str)
        -> anyhow::Result<Option<PasswordResetToken>>;
}

#[derive(Clone)]
pub struct PgAuthStore {
    db: PgPool,
}

impl PgAuthStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::EmailTaken
            } else {
                StoreError::Other(e.into())
            }
        })?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.password_hash)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::EmailTaken
            } else {
                StoreError::Other(e.into())
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_reset_token(&self, user_id: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token, user_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(token)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::TokenExists
            } else {
                StoreError::Other(e.into())
            }
        })?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            DELETE FROM password_reset_tokens
            WHERE token = $1
            RETURNING token, user_id, created_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}
