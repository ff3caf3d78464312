//! Password, session and social authentication.
//!
//! Sessions are opaque random tokens stored server-side; the gateway carries
//! them in the session cookie or a bearer header.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use conducky_config::AuthConfig;
use conducky_database::{new_id, now, parse_timestamp, timestamp, RoleName, User};
use rand::RngCore;
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{info, warn};

mod oauth;
mod password;

use oauth::OAuthClient;
pub use oauth::{SocialProfile, SocialProvider};
pub use password::{validate_email, validate_password, MIN_PASSWORD_LENGTH};

const USER_COLUMNS: &str = "id, email, name, avatar_url, password_hash, created_at, updated_at";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("{0}")]
    WeakPassword(String),
    #[error("{0} oauth is not configured")]
    ProviderDisabled(SocialProvider),
    #[error("oauth error: {0}")]
    OAuth(#[from] anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
    #[error("invalid or expired reset token")]
    InvalidResetToken,
    #[error("user not found")]
    UserNotFound,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub session: AuthSession,
    pub granted_super_admin: bool,
}

/// A freshly issued password reset token.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
    reset_ttl: Duration,
    github: Option<OAuthClient>,
    google: Option<OAuthClient>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let session_ttl = Duration::seconds(config.session_ttl_seconds.min(i64::MAX as u64) as i64);
        let reset_ttl = Duration::minutes(config.password_reset_ttl_minutes.max(1));

        Self {
            pool,
            session_ttl,
            reset_ttl,
            github: oauth_client(SocialProvider::Github, &config),
            google: oauth_client(SocialProvider::Google, &config),
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn provider_enabled(&self, provider: SocialProvider) -> bool {
        self.oauth(provider).is_ok()
    }

    fn oauth(&self, provider: SocialProvider) -> Result<&OAuthClient, AuthError> {
        let client = match provider {
            SocialProvider::Github => self.github.as_ref(),
            SocialProvider::Google => self.google.as_ref(),
        };
        client.ok_or(AuthError::ProviderDisabled(provider))
    }

    pub fn authorization_url(
        &self,
        provider: SocialProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        self.oauth(provider)?
            .authorize_url(state, redirect_uri)
            .map_err(AuthError::OAuth)
    }

    /// Create a local account and log it in. The very first account receives
    /// the global SuperAdmin grant.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Registration, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        let password_hash = password::hash_password(password)?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM users WHERE email = ? COLLATE NOCASE")
                .bind(&email)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(AuthError::UserExists);
        }

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;

        let name = name.map(str::trim).filter(|value| !value.is_empty());
        let user = insert_user(&mut tx, &email, name, None, Some(&password_hash)).await?;

        let granted_super_admin = user_count == 0;
        if granted_super_admin {
            sqlx::query(
                "INSERT INTO user_global_roles (user_id, role_id, created_at) SELECT ?, id, ? FROM roles WHERE name = ?",
            )
            .bind(&user.id)
            .bind(now())
            .bind(RoleName::SuperAdmin.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if granted_super_admin {
            info!(user_id = %user.id, "first user registered, granted SuperAdmin");
        } else {
            info!(user_id = %user.id, "user registered");
        }

        let session = self.issue_session(&user.id).await?;
        Ok(Registration {
            user,
            session,
            granted_super_admin,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, AuthSession), AuthError> {
        let email = normalize_email(email);
        let user = fetch_user_by_email(&self.pool, &email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let stored = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        password::verify_password(password, stored)?;

        let session = self.issue_session(&user.id).await?;
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        let Some((user_id, expires_at)) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let expires_at = parse_timestamp(&expires_at).ok_or(AuthError::InvalidSession)?;

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = fetch_user(&self.pool, &user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = fetch_user(&self.pool, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let stored = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        password::verify_password(current_password, stored)?;
        validate_password(new_password)?;

        let password_hash = password::hash_password(new_password)?;
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        info!(user_id, "password changed");
        Ok(())
    }

    /// Issue a single-use reset token, invalidating earlier unused ones.
    /// Returns `None` for unknown addresses so callers can answer uniformly.
    pub async fn create_password_reset(&self, email: &str) -> Result<Option<PasswordReset>, AuthError> {
        let email = normalize_email(email);
        let Some(user) = fetch_user_by_email(&self.pool, &email).await? else {
            return Ok(None);
        };

        let token = generate_token();
        let expires_at = Utc::now() + self.reset_ttl;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE password_reset_tokens SET used = 1 WHERE user_id = ? AND used = 0")
            .bind(&user.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token, expires_at, used, created_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(new_id())
        .bind(&user.id)
        .bind(&token)
        .bind(timestamp(expires_at))
        .bind(now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %user.id, "password reset token issued");
        Ok(Some(PasswordReset {
            user,
            token,
            expires_at,
        }))
    }

    /// Expiry of an unused, unexpired reset token.
    pub async fn validate_reset_token(&self, token: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
        let expires_at: Option<String> = sqlx::query_scalar(
            "SELECT expires_at FROM password_reset_tokens WHERE token = ? AND used = 0",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expires_at
            .as_deref()
            .and_then(parse_timestamp)
            .filter(|expires_at| *expires_at > Utc::now()))
    }

    /// Set a new password from a reset token, consume the token and end every
    /// session the user had.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User, AuthError> {
        validate_password(new_password)?;
        let password_hash = password::hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;

        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT id, user_id, expires_at FROM password_reset_tokens WHERE token = ? AND used = 0",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((token_id, user_id, expires_at)) = row else {
            return Err(AuthError::InvalidResetToken);
        };
        let still_valid = parse_timestamp(&expires_at)
            .map(|expires_at| expires_at > Utc::now())
            .unwrap_or(false);
        if !still_valid {
            return Err(AuthError::InvalidResetToken);
        }

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(now())
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE password_reset_tokens SET used = 1 WHERE id = ?")
            .bind(&token_id)
            .execute(&mut *tx)
            .await?;
        let ended = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(&user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!(user_id = %user_id, sessions_ended = ended, "password reset completed");
        fetch_user(&self.pool, &user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn login_with_oauth_code(
        &self,
        provider: SocialProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(User, AuthSession), AuthError> {
        let profile = self
            .oauth(provider)?
            .exchange_code(code, redirect_uri)
            .await
            .map_err(AuthError::OAuth)?;

        self.login_with_social_profile(profile).await
    }

    /// Find the user linked to the social identity, or link it to the user
    /// with the same email, or create a new user. Then start a session.
    pub async fn login_with_social_profile(
        &self,
        profile: SocialProfile,
    ) -> Result<(User, AuthSession), AuthError> {
        let mut tx = self.pool.begin().await?;

        let linked: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM social_accounts WHERE provider = ? AND provider_id = ?",
        )
        .bind(profile.provider.as_str())
        .bind(&profile.id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user_id) = linked {
            tx.commit().await?;
            let user = fetch_user(&self.pool, &user_id)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            let session = self.issue_session(&user.id).await?;
            return Ok((user, session));
        }

        let email = profile
            .email
            .as_deref()
            .map(normalize_email)
            .ok_or_else(|| {
                AuthError::OAuth(anyhow::anyhow!(
                    "{} did not provide an email address",
                    profile.provider
                ))
            })?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM users WHERE email = ? COLLATE NOCASE")
                .bind(&email)
                .fetch_optional(&mut *tx)
                .await?;

        let user_id = match existing {
            Some(user_id) => user_id,
            None => {
                insert_user(
                    &mut tx,
                    &email,
                    profile.name.as_deref(),
                    profile.avatar_url.as_deref(),
                    None,
                )
                .await?
                .id
            }
        };

        sqlx::query(
            "INSERT INTO social_accounts (id, user_id, provider, provider_id, provider_email, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&user_id)
        .bind(profile.provider.as_str())
        .bind(&profile.id)
        .bind(&email)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user_id = %user_id, provider = %profile.provider, "linked social account");
        let user = fetch_user(&self.pool, &user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let session = self.issue_session(&user.id).await?;
        Ok((user, session))
    }

    async fn issue_session(&self, user_id: &str) -> Result<AuthSession, AuthError> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(timestamp(now))
        .bind(timestamp(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id: user_id.to_owned(),
            expires_at,
        })
    }
}

fn oauth_client(provider: SocialProvider, config: &AuthConfig) -> Option<OAuthClient> {
    let provider_config = match provider {
        SocialProvider::Github => &config.github,
        SocialProvider::Google => &config.google,
    };
    match OAuthClient::from_config(provider, provider_config) {
        Ok(client) => client,
        Err(err) => {
            warn!(%provider, error = %err, "oauth provider disabled");
            None
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn insert_user(
    tx: &mut Transaction<'_, Sqlite>,
    email: &str,
    name: Option<&str>,
    avatar_url: Option<&str>,
    password_hash: Option<&str>,
) -> Result<User, AuthError> {
    let id = new_id();
    let created_at = now();

    sqlx::query(
        "INSERT INTO users (id, email, name, avatar_url, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(name)
    .bind(avatar_url)
    .bind(password_hash)
    .bind(&created_at)
    .bind(&created_at)
    .execute(&mut **tx)
    .await?;

    Ok(User {
        id,
        email: email.to_owned(),
        name: name.map(str::to_owned),
        avatar_url: avatar_url.map(str::to_owned),
        password_hash: password_hash.map(str::to_owned),
        created_at: created_at.clone(),
        updated_at: created_at,
    })
}

async fn fetch_user(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE");
    sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
}
