use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "conducky.toml",
    "config/conducky.toml",
    "crates/config/conducky.toml",
    "../conducky.toml",
    "../config/conducky.toml",
    "backend/conducky.toml",
    "backend/config/conducky.toml",
];

/// Environment variables understood by the legacy deployment, mapped onto
/// configuration keys. They are applied as overrides, so they take precedence
/// over files and `CONDUCKY__*` variables.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("EMAIL_PROVIDER", "email.provider"),
    ("EMAIL_FROM", "email.from"),
    ("EMAIL_REPLY_TO", "email.reply_to"),
    ("SMTP_HOST", "email.smtp.host"),
    ("SMTP_PORT", "email.smtp.port"),
    ("SMTP_SECURE", "email.smtp.secure"),
    ("SMTP_USER", "email.smtp.username"),
    ("SMTP_PASS", "email.smtp.password"),
    ("SENDGRID_API_KEY", "email.sendgrid.api_key"),
    ("GITHUB_CLIENT_ID", "auth.github.client_id"),
    ("GITHUB_CLIENT_SECRET", "auth.github.client_secret"),
    ("GOOGLE_CLIENT_ID", "auth.google.client_id"),
    ("GOOGLE_CLIENT_SECRET", "auth.google.client_secret"),
    ("FRONTEND_BASE_URL", "auth.frontend_base_url"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
    pub security: SecurityConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://conducky.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_seconds: u64,
    /// Name of the cookie carrying the session token.
    pub cookie_name: String,
    pub secure_cookies: bool,
    /// Base URL of the web client, used to build links in outgoing email.
    pub frontend_base_url: String,
    pub password_reset_ttl_minutes: i64,
    pub github: OAuthProviderConfig,
    pub google: OAuthProviderConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 86_400,
            cookie_name: "connect.sid".to_string(),
            secure_cookies: false,
            frontend_base_url: "http://localhost:3001".to_string(),
            password_reset_ttl_minutes: 30,
            github: OAuthProviderConfig::default(),
            google: OAuthProviderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OAuthProviderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl OAuthProviderConfig {
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}

/// Which backend delivers transactional email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderKind {
    #[default]
    Console,
    Smtp,
    Sendgrid,
}

impl std::fmt::Display for EmailProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Console => "console",
            Self::Smtp => "smtp",
            Self::Sendgrid => "sendgrid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub provider: EmailProviderKind,
    pub from: String,
    pub reply_to: Option<String>,
    pub templates_dir: PathBuf,
    pub smtp: SmtpConfig,
    pub sendgrid: SendGridConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProviderKind::Console,
            from: "noreply@conducky.local".to_string(),
            reply_to: None,
            templates_dir: PathBuf::from("templates/emails"),
            smtp: SmtpConfig::default(),
            sendgrid: SendGridConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    /// Implicit TLS (port 465 style). When false, STARTTLS is used.
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            secure: false,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SendGridConfig {
    pub api_key: Option<String>,
}

/// A sliding-window request cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub general: RateLimitRule,
    pub auth: RateLimitRule,
    pub password_reset: RateLimitRule,
    pub report_creation: RateLimitRule,
    pub evidence_upload: RateLimitRule,
    pub comment: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            general: RateLimitRule::new(1000, 15 * 60),
            auth: RateLimitRule::new(5, 15 * 60),
            password_reset: RateLimitRule::new(3, 60 * 60),
            report_creation: RateLimitRule::new(10, 60 * 60),
            evidence_upload: RateLimitRule::new(20, 60 * 60),
            comment: RateLimitRule::new(30, 15 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub input_scanner: bool,
    pub hsts_max_age_seconds: u64,
    pub content_security_policy: String,
    pub rate_limits: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec!["http://localhost:3001".to_string()],
            input_scanner: true,
            hsts_max_age_seconds: 31_536_000,
            content_security_policy: "default-src 'self'; script-src 'self'; \
                 style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; \
                 object-src 'none'; frame-ancestors 'none'; base-uri 'self'; form-action 'self'"
                .to_string(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub evidence_max_bytes: usize,
    pub json_max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            evidence_max_bytes: 10 * 1024 * 1024,
            json_max_bytes: 1024 * 1024,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use conducky_config::load;
///
/// std::env::remove_var("CONDUCKY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = config::Config::try_from(&AppConfig::default())
        .context("unable to serialise default configuration")?;

    let mut builder = config::Config::builder().add_source(defaults);

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CONDUCKY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CONDUCKY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    for (variable, key) in LEGACY_ENV_KEYS {
        let value = std::env::var(variable).ok().filter(|value| !value.is_empty());
        builder = builder
            .set_override_option(*key, value)
            .with_context(|| format!("unable to apply {variable}"))?;
    }

    if let Ok(origins) = std::env::var("CORS_ORIGIN") {
        let origins: Vec<String> = split_list(&origins);
        if !origins.is_empty() {
            builder = builder
                .set_override("security.cors_origins", origins)
                .context("unable to apply CORS_ORIGIN")?;
        }
    }

    let environment_overrides = config::Environment::with_prefix("CONDUCKY")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("security.cors_origins")
        .try_parsing(true);

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    debug!(
        http = ?config.http,
        database = %config.database.url,
        email_provider = %config.email.provider,
        "loaded backend configuration"
    );
    Ok(config)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty_entries() {
        assert_eq!(
            split_list(" https://a.example , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn oauth_credentials_require_both_halves() {
        let mut provider = OAuthProviderConfig::default();
        assert!(provider.credentials().is_none());

        provider.client_id = Some("id".into());
        assert!(provider.credentials().is_none());

        provider.client_secret = Some("secret".into());
        assert_eq!(
            provider.credentials(),
            Some(("id".to_string(), "secret".to_string()))
        );
    }
}
