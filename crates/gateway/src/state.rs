//! Shared application state for the gateway

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conducky_auth::Authenticator;
use conducky_config::{AppConfig, AuthConfig, SecurityConfig, UploadConfig};
use conducky_database::{
    AuditRepository, CommentRepository, EventRepository, EvidenceRepository, InviteRepository,
    NotificationRepository, OrganizationRepository, ReportRepository, RoleRepository,
    UserRepository,
};
use conducky_email::EmailService;
use rand::{distributions::Alphanumeric, Rng};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::rate_limit::RateLimiter;

const DEFAULT_OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

/// Configuration sections the HTTP layer reads at request time.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub uploads: UploadConfig,
}

#[derive(Clone)]
pub struct GatewayState {
    pool: SqlitePool,
    authenticator: Authenticator,
    email: EmailService,
    oauth_state: OAuthStateStore,
    rate_limiter: RateLimiter,
    settings: Arc<GatewaySettings>,
}

impl GatewayState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        let authenticator = Authenticator::new(pool.clone(), config.auth.clone());
        let email = EmailService::new(
            config.email.clone(),
            config.auth.frontend_base_url.clone(),
            config.auth.password_reset_ttl_minutes,
        );
        Self::from_parts(pool, authenticator, email, config)
    }

    pub fn from_parts(
        pool: SqlitePool,
        authenticator: Authenticator,
        email: EmailService,
        config: &AppConfig,
    ) -> Self {
        Self {
            pool,
            authenticator,
            email,
            oauth_state: OAuthStateStore::default(),
            rate_limiter: RateLimiter::new(config.security.rate_limits.clone()),
            settings: Arc::new(GatewaySettings {
                auth: config.auth.clone(),
                security: config.security.clone(),
                uploads: config.uploads.clone(),
            }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn email(&self) -> &EmailService {
        &self.email
    }

    pub fn oauth_state(&self) -> &OAuthStateStore {
        &self.oauth_state
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn roles(&self) -> RoleRepository {
        RoleRepository::new(self.pool.clone())
    }

    pub fn events(&self) -> EventRepository {
        EventRepository::new(self.pool.clone())
    }

    pub fn reports(&self) -> ReportRepository {
        ReportRepository::new(self.pool.clone())
    }

    pub fn comments(&self) -> CommentRepository {
        CommentRepository::new(self.pool.clone())
    }

    pub fn evidence(&self) -> EvidenceRepository {
        EvidenceRepository::new(self.pool.clone())
    }

    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository::new(self.pool.clone())
    }

    pub fn invites(&self) -> InviteRepository {
        InviteRepository::new(self.pool.clone())
    }

    pub fn organizations(&self) -> OrganizationRepository {
        OrganizationRepository::new(self.pool.clone())
    }

    pub fn audit(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }
}

/// Single-use CSRF states for the OAuth redirect dance.
#[derive(Clone)]
pub struct OAuthStateStore {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn issue(&self) -> String {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.store(state.clone()).await;
        state
    }

    pub async fn store(&self, state: String) {
        let mut guard = self.inner.lock().await;
        Self::prune(&mut guard, self.ttl);
        guard.insert(state, Instant::now());
    }

    pub async fn consume(&self, state: &str) -> bool {
        let mut guard = self.inner.lock().await;
        Self::prune(&mut guard, self.ttl);
        guard.remove(state).is_some()
    }

    fn prune(map: &mut HashMap<String, Instant>, ttl: Duration) {
        let now = Instant::now();
        map.retain(|_, issued| now.duration_since(*issued) <= ttl);
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_OAUTH_STATE_TTL)
    }
}
