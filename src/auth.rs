use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use tracing::{error, info, warn};

use crate::db::{Database, User};
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "sessionid";
pub const LOGIN_URL: &str = "/auth/login/";

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_USERNAME_LENGTH: usize = 150;

/// Account failures shown back on the login and signup forms.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.")]
    InvalidUsername,
    #[error("A user with that username already exists.")]
    UsernameTaken,
    #[error("This password is too short. It must contain at least {0} characters.")]
    PasswordTooShort(usize),
    #[error("Please enter a correct username and password.")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .context("Failed to hash password")?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(password_hash).context("Failed to parse password hash")?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn generate_session_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

pub fn validate_username(username: &str) -> Result<(), AuthError> {
    // "." and ".." would collapse out of /profile/<username>/ links
    let valid = !username.is_empty()
        && !username.chars().all(|c| c == '.')
        && username.chars().count() <= MAX_USERNAME_LENGTH
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername)
    }
}

pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::PasswordTooShort(MIN_PASSWORD_LENGTH));
    }
    Ok(())
}

/// Create an account. The username is trimmed before validation.
pub async fn register(db: &Database, username: &str, password: &str) -> Result<User, AuthError> {
    let username = username.trim();
    validate_username(username)?;
    validate_password_strength(password)?;

    if db.get_user_by_username(username).await?.is_some() {
        return Err(AuthError::UsernameTaken);
    }

    let password_hash = hash_password(password)?;
    let id = db.create_user(username, &password_hash).await?;
    info!("Registered user '{}'", username);

    db.get_user(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user {id} vanished after insert").into())
}

pub async fn authenticate(
    db: &Database,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    let Some(user) = db.get_user_by_username(username.trim()).await? else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!("Failed login for '{}'", user.username);
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}

/// Store a new session for `user_id` and return its token.
pub async fn start_session(
    db: &Database,
    user_id: i64,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let token = generate_session_token();
    let expires_at = chrono::Utc::now() + ttl;
    db.create_session(user_id, &token, expires_at).await?;
    Ok(token)
}

pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// HttpOnly session cookie living as long as the stored session.
pub fn session_cookie(token: String, ttl: chrono::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Matches the session cookie's path so that `CookieJar::remove` clears it.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Redirect to the login page, remembering where the user was going.
pub fn login_redirect(next: &str) -> Response {
    let next = urlencoding::encode(next).replace("%2F", "/");
    Redirect::to(&format!("{LOGIN_URL}?next={next}")).into_response()
}

/// Only local absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && path.chars().all(|c| c.is_ascii_graphic() && c != '\\') =>
        {
            path
        }
        _ => "/",
    }
}

/// Current authenticated user, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn username(&self) -> Option<String> {
        self.0.as_ref().map(|u| u.username.clone())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = match CookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        let Some(token) = session_token(&jar) else {
            return Ok(MaybeUser(None));
        };

        match state.db.get_session_user(&token).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                error!("Session lookup failed: {}", e);
                Ok(MaybeUser(None))
            }
        }
    }
}

/// Current authenticated user. Anonymous requests are redirected to the
/// login page with a `next` parameter.
#[derive(Debug, Clone)]
pub struct RequireUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = match MaybeUser::from_request_parts(parts, state).await {
            Ok(user) => user,
            Err(never) => match never {},
        };

        match user {
            Some(user) => Ok(RequireUser(user)),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(login_redirect(next))
            }
        }
    }
}

pub async fn start_session_sweeper(db: Arc<Database>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.max(1).saturating_mul(60));

    loop {
        tokio::time::sleep(interval).await;
        match db.delete_expired_sessions().await {
            Ok(0) => {}
            Ok(purged) => info!("Purged {} expired sessions", purged),
            Err(e) => error!("Session sweep failed: {}", e),
        }
    }
}
