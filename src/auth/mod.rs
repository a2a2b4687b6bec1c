use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::Duration;
use cookie::{Cookie, SameSite};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    clock::Clock,
    domain::User,
    error::{AppError, Result},
    repository::UserRepository,
};

pub mod session;

use session::{Session, SessionStore};

pub const SESSION_COOKIE: &str = "session";

pub struct AuthService {
    session_store: SessionStore,
    user_repo: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(pool: SqlitePool, user_repo: Arc<dyn UserRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_store: SessionStore::new(pool),
            user_repo,
            clock,
        }
    }

    /// Checks credentials and returns the user. Unknown emails and wrong
    /// passwords are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        let hash = self.user_repo.password_hash(&email).await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &hash)? {
            tracing::debug!(%email, "Failed login attempt");
            return Err(AppError::Unauthorized);
        }

        let user = self.user_repo.find_by_email(&email).await?
            .ok_or(AppError::Unauthorized)?;
        if !user.is_active {
            return Err(AppError::Forbidden);
        }
        Ok(user)
    }

    pub async fn create_session(&self, user_id: Uuid, duration_hours: i64) -> Result<(Session, String)> {
        let token = generate_token();
        let now = self.clock.now();
        let expires_at = now + Duration::hours(duration_hours);

        let session = self.session_store
            .create(user_id, &token, expires_at, now)
            .await?;

        Ok((session, token))
    }

    /// Resolves a raw session token to its user.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>> {
        let Some(session) = self.session_store.find_by_token(token, self.clock.now()).await? else {
            return Ok(None);
        };
        self.user_repo.find_by_id(session.user_id).await
    }

    pub async fn invalidate_session(&self, token: &str) -> Result<()> {
        self.session_store.delete_by_token(token).await
    }

    pub async fn invalidate_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        self.session_store.delete_by_user(user_id).await
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        self.session_store.cleanup_expired(self.clock.now()).await
    }

    pub fn create_session_cookie(&self, token: &str, secure: bool, duration_hours: i64) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token.to_string()))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .secure(secure)
            .max_age(cookie::time::Duration::hours(duration_hours))
            .build()
    }

    pub fn create_logout_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(cookie::time::Duration::seconds(0))
            .build()
    }
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
