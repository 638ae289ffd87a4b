use std::sync::Arc;

use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        notify::Notifier,
        password::PasswordHasher,
        repo::{AuthStore, StoreError},
        repo_types::{User, UserChanges},
    },
    error::ApiError,
};

const MIN_PASSWORD_LEN: usize = 8;
const RESET_TOKEN_LEN: usize = 48;
const RESET_TOKEN_CREATE_ATTEMPTS: usize = 3;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Orchestrates the credential lifecycle over injected collaborators: a
/// persistence store, the password hasher, the token issuer, and the
/// outbound notifier.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
    notifier: Arc<dyn Notifier>,
    reset_ttl: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        hasher: PasswordHasher,
        keys: JwtKeys,
        notifier: Arc<dyn Notifier>,
        reset_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            hasher,
            keys,
            notifier,
            reset_ttl: Duration::minutes(reset_ttl_minutes),
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<(User, String), ApiError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(ApiError::Validation("Invalid email".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(ApiError::Validation("Password too short".into()));
        }

        // Pre-check for a friendlier error; the unique constraint below is
        // the backstop against concurrent duplicate signups.
        if self.store.find_user_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(ApiError::Conflict("Email already registered"));
        }

        let hash = self.hasher.hash(password)?;
        let user = match self.store.create_user(&email, &hash).await {
            Ok(u) => u,
            Err(StoreError::EmailTaken) => {
                warn!(email = %email, "email already registered");
                return Err(ApiError::Conflict("Email already registered"));
            }
            Err(e) => return Err(ApiError::Internal(e.into())),
        };

        let token = self.keys.sign(user.id)?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok((user, token))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), ApiError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(ApiError::Validation("Invalid email".into()));
        }

        // Unknown email and wrong password produce the same outcome so the
        // endpoint cannot be used to probe which emails are registered.
        let user = match self.store.find_user_by_email(&email).await? {
            Some(u) => u,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(ApiError::Unauthorized);
            }
        };

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(ApiError::Unauthorized);
        }

        let token = self.keys.sign(user.id)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok((user, token))
    }

    /// Always succeeds from the caller's point of view; whether a token was
    /// created is never revealed.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ApiError::Validation("Invalid email".into()));
        }

        let user = match self.store.find_user_by_email(&email).await? {
            Some(u) => u,
            None => {
                info!("password reset requested for unknown email");
                return Ok(());
            }
        };

        let token = self.issue_reset_token(user.id).await?;
        if let Err(e) = self.notifier.send_reset_link(&user.email, &token).await {
            error!(error = %e, user_id = %user.id, "reset link delivery failed");
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation("Password too short".into()));
        }

        // Single atomic delete-and-return: a second caller with the same
        // token sees nothing, even mid-flight.
        let record = self
            .store
            .consume_reset_token(token)
            .await?
            .ok_or(ApiError::InvalidResetToken)?;

        if OffsetDateTime::now_utc() - record.created_at > self.reset_ttl {
            warn!(user_id = %record.user_id, "expired reset token");
            return Err(ApiError::ExpiredResetToken);
        }

        let hash = self.hasher.hash(new_password)?;
        match self
            .store
            .update_user(
                record.user_id,
                UserChanges {
                    password_hash: Some(hash),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) => {}
            // user deleted between consume and update
            Err(StoreError::NotFound) => return Err(ApiError::InvalidResetToken),
            Err(e) => return Err(ApiError::Internal(e.into())),
        }

        info!(user_id = %record.user_id, "password reset completed");
        Ok(())
    }

    pub async fn update_credentials(
        &self,
        user_id: Uuid,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<User, ApiError> {
        if email.is_none() && password.is_none() {
            return Err(ApiError::Validation("Nothing to update".into()));
        }

        let email = match email {
            Some(e) => {
                let e = normalize_email(&e);
                if !is_valid_email(&e) {
                    return Err(ApiError::Validation("Invalid email".into()));
                }
                Some(e)
            }
            None => None,
        };
        let password_hash = match password.as_deref() {
            Some(p) if p.len() < MIN_PASSWORD_LEN => {
                return Err(ApiError::Validation("Password too short".into()));
            }
            Some(p) => Some(self.hasher.hash(p)?),
            None => None,
        };

        match self
            .store
            .update_user(user_id, UserChanges { email, password_hash })
            .await
        {
            Ok(()) => {}
            Err(StoreError::EmailTaken) => {
                return Err(ApiError::Conflict("Email already registered"))
            }
            Err(StoreError::NotFound) => return Err(ApiError::NotFound("User not found")),
            Err(e) => return Err(ApiError::Internal(e.into())),
        }

        info!(user_id = %user_id, "credentials updated");
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ApiError::NotFound("User not found"))
    }

    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), ApiError> {
        if !self.store.delete_user(user_id).await? {
            return Err(ApiError::NotFound("User not found"));
        }
        info!(user_id = %user_id, "account deleted");
        Ok(())
    }

    pub async fn me(&self, user_id: Uuid) -> Result<User, ApiError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ApiError::Unauthorized)
    }

    async fn issue_reset_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        // Token primary key makes a collision a constraint violation; with
        // 48 alphanumeric chars one essentially never happens, but a fresh
        // draw costs nothing.
        for _ in 0..RESET_TOKEN_CREATE_ATTEMPTS {
            let token = generate_reset_token();
            match self.store.create_reset_token(user_id, &token).await {
                Ok(()) => return Ok(token),
                Err(StoreError::TokenExists) => continue,
                Err(e) => return Err(ApiError::Internal(e.into())),
            }
        }
        Err(ApiError::Internal(anyhow::anyhow!(
            "could not allocate a unique reset token"
        )))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::repo_types::PasswordResetToken;
    use crate::config::AppConfig;

    #[derive(Default)]
    struct MemStore {
        users: Mutex<Vec<User>>,
        tokens: Mutex<HashMap<String, PasswordResetToken>>,
    }

    #[async_trait]
    impl AuthStore for MemStore {
        async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .cloned())
        }

        async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u.email == email) {
                return Err(StoreError::EmailTaken);
            }
            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            users.push(user.clone());
            Ok(user)
        }

        async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<(), StoreError> {
            let mut users = self.users.lock().unwrap();
            if let Some(email) = &changes.email {
                if users.iter().any(|u| u.email == *email && u.id != id) {
                    return Err(StoreError::EmailTaken);
                }
            }
            let user = users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or(StoreError::NotFound)?;
            if let Some(email) = changes.email {
                user.email = email;
            }
            if let Some(hash) = changes.password_hash {
                user.password_hash = hash;
            }
            Ok(())
        }

        async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
            let mut users = self.users.lock().unwrap();
            let before = users.len();
            users.retain(|u| u.id != id);
            // mirror the database's ON DELETE CASCADE
            self.tokens.lock().unwrap().retain(|_, t| t.user_id != id);
            Ok(users.len() < before)
        }

        async fn create_reset_token(&self, user_id: Uuid, token: &str) -> Result<(), StoreError> {
            let mut tokens = self.tokens.lock().unwrap();
            if tokens.contains_key(token) {
                return Err(StoreError::TokenExists);
            }
            tokens.insert(
                token.to_string(),
                PasswordResetToken {
                    token: token.to_string(),
                    user_id,
                    created_at: OffsetDateTime::now_utc(),
                },
            );
            Ok(())
        }

        async fn consume_reset_token(
            &self,
            token: &str,
        ) -> anyhow::Result<Option<PasswordResetToken>> {
            Ok(self.tokens.lock().unwrap().remove(token))
        }
    }

    #[derive(Default)]
    struct CaptureNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for CaptureNotifier {
        async fn send_reset_link(&self, email: &str, token: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), token.to_string()));
            Ok(())
        }
    }

    fn service() -> (AuthService, Arc<MemStore>, Arc<CaptureNotifier>) {
        let cfg = AppConfig::for_tests();
        let store = Arc::new(MemStore::default());
        let notifier = Arc::new(CaptureNotifier::default());
        let svc = AuthService::new(
            store.clone(),
            PasswordHasher::new(&cfg.hash).unwrap(),
            JwtKeys::from_config(&cfg.jwt),
            notifier.clone(),
            cfg.reset_token_ttl_minutes,
        );
        (svc, store, notifier)
    }

    fn last_token(notifier: &CaptureNotifier) -> String {
        notifier.sent.lock().unwrap().last().unwrap().1.clone()
    }

    #[tokio::test]
    async fn signup_returns_identity_and_valid_token() {
        let (svc, _, _) = service();
        let (user, token) = svc.signup("  U@X.com ", "secret-1").await.unwrap();
        assert_eq!(user.email, "u@x.com");

        let keys = JwtKeys::from_config(&AppConfig::for_tests().jwt);
        assert_eq!(keys.verify(&token).unwrap().sub, user.id);
    }

    #[tokio::test]
    async fn signup_rejects_malformed_input() {
        let (svc, _, _) = service();
        assert!(matches!(
            svc.signup("", "long-enough-pw").await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            svc.signup("not-an-email", "long-enough-pw").await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            svc.signup("a@x.com", "short").await.unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let (svc, _, _) = service();
        svc.signup("a@x.com", "password-1").await.unwrap();
        assert!(matches!(
            svc.signup("a@x.com", "password-2").await.unwrap_err(),
            ApiError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn login_failure_is_indistinguishable() {
        let (svc, _, _) = service();
        svc.signup("a@x.com", "password-1").await.unwrap();

        let wrong_password = svc.login("a@x.com", "password-2").await.unwrap_err();
        let unknown_email = svc.login("b@x.com", "password-1").await.unwrap_err();
        assert!(matches!(wrong_password, ApiError::Unauthorized));
        assert_eq!(
            std::mem::discriminant(&wrong_password),
            std::mem::discriminant(&unknown_email)
        );
    }

    #[tokio::test]
    async fn forgot_password_is_silent_for_unknown_email() {
        let (svc, store, notifier) = service();
        svc.forgot_password("ghost@x.com").await.unwrap();
        assert!(notifier.sent.lock().unwrap().is_empty());
        assert!(store.tokens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let (svc, _, notifier) = service();
        svc.signup("a@x.com", "password-1").await.unwrap();
        svc.forgot_password("a@x.com").await.unwrap();

        let token = last_token(&notifier);
        svc.reset_password(&token, "password-2").await.unwrap();
        assert!(matches!(
            svc.reset_password(&token, "password-3").await.unwrap_err(),
            ApiError::InvalidResetToken
        ));
    }

    #[tokio::test]
    async fn unknown_reset_token_is_invalid() {
        let (svc, _, _) = service();
        assert!(matches!(
            svc.reset_password("no-such-token", "password-2").await.unwrap_err(),
            ApiError::InvalidResetToken
        ));
    }

    #[tokio::test]
    async fn overage_reset_token_expires_even_if_unused() {
        let (svc, store, _) = service();
        let (user, _) = svc.signup("a@x.com", "password-1").await.unwrap();

        let token = "backdated-token".to_string();
        store.tokens.lock().unwrap().insert(
            token.clone(),
            PasswordResetToken {
                token: token.clone(),
                user_id: user.id,
                created_at: OffsetDateTime::now_utc() - Duration::minutes(16),
            },
        );

        assert!(matches!(
            svc.reset_password(&token, "password-2").await.unwrap_err(),
            ApiError::ExpiredResetToken
        ));
        // lazily purged on the failed attempt
        assert!(store.tokens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn password_rotation_end_to_end() {
        let (svc, _, notifier) = service();

        let (user, token) = svc.signup("u@x.com", "secret-1").await.unwrap();
        assert!(!token.is_empty());

        let (logged_in, _) = svc.login("u@x.com", "secret-1").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        svc.forgot_password("u@x.com").await.unwrap();
        let reset = last_token(&notifier);
        svc.reset_password(&reset, "secret-2").await.unwrap();

        assert!(matches!(
            svc.login("u@x.com", "secret-1").await.unwrap_err(),
            ApiError::Unauthorized
        ));
        svc.login("u@x.com", "secret-2").await.unwrap();
    }

    #[tokio::test]
    async fn update_credentials_applies_partial_changes() {
        let (svc, _, _) = service();
        let (user, _) = svc.signup("a@x.com", "password-1").await.unwrap();

        assert!(matches!(
            svc.update_credentials(user.id, None, None).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        let updated = svc
            .update_credentials(user.id, Some("B@x.com".into()), None)
            .await
            .unwrap();
        assert_eq!(updated.email, "b@x.com");
        // password unchanged
        svc.login("b@x.com", "password-1").await.unwrap();

        svc.update_credentials(user.id, None, Some("password-2".into()))
            .await
            .unwrap();
        svc.login("b@x.com", "password-2").await.unwrap();
    }

    #[tokio::test]
    async fn update_credentials_respects_email_uniqueness() {
        let (svc, _, _) = service();
        svc.signup("a@x.com", "password-1").await.unwrap();
        let (other, _) = svc.signup("b@x.com", "password-1").await.unwrap();

        assert!(matches!(
            svc.update_credentials(other.id, Some("a@x.com".into()), None)
                .await
                .unwrap_err(),
            ApiError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn delete_account_removes_user_and_tokens() {
        let (svc, store, notifier) = service();
        let (user, _) = svc.signup("a@x.com", "password-1").await.unwrap();
        svc.forgot_password("a@x.com").await.unwrap();
        let token = last_token(&notifier);

        svc.delete_account(user.id).await.unwrap();
        assert!(store.find_user_by_id(user.id).await.unwrap().is_none());
        assert!(matches!(
            svc.reset_password(&token, "password-2").await.unwrap_err(),
            ApiError::InvalidResetToken
        ));
        assert!(matches!(
            svc.delete_account(user.id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn reset_tokens_are_long_and_unique() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn email_validation_is_permissive_but_sane() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("a@x"));
    }
}
