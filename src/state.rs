use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{
    jwt::JwtKeys, notify::LogNotifier, password::PasswordHasher, repo::PgAuthStore,
    service::AuthService,
};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Self::from_parts(db, config)
    }

    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let auth = AuthService::new(
            Arc::new(PgAuthStore::new(db.clone())),
            PasswordHasher::new(&config.hash)?,
            JwtKeys::from_config(&config.jwt),
            Arc::new(LogNotifier),
            config.reset_token_ttl_minutes,
        );
        Ok(Self { db, config, auth })
    }
}
