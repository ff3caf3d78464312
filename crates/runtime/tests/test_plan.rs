//! Bootstrap checks for `conducky-runtime`: what `BackendServices::initialise`
//! wires together from an `AppConfig`, and how the process shuts down.

use std::time::Duration;

use anyhow::{Context, Result};
use conducky_auth::{AuthError, SocialProvider};
use conducky_config::{AppConfig, EmailProviderKind};
use conducky_runtime::BackendServices;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

struct Bootstrap {
    config: AppConfig,
    _temp_dir: TempDir,
}

impl Bootstrap {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let mut config = AppConfig::default();
        config.database.url = format!(
            "sqlite://{}",
            temp_dir.path().join("conducky/runtime.db").display()
        );
        Ok(Self {
            config,
            _temp_dir: temp_dir,
        })
    }

    async fn start(&self) -> Result<BackendServices> {
        BackendServices::initialise(&self.config)
            .await
            .context("failed to initialise backend services")
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_seeds_the_four_roles() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let services = bootstrap.start().await?;

    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM roles ORDER BY name")
        .fetch_all(&services.db_pool)
        .await?;
    assert_eq!(names, ["Admin", "Reporter", "Responder", "SuperAdmin"]);

    let again = bootstrap.start().await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
        .fetch_one(&again.db_pool)
        .await?;
    assert_eq!(count, 4, "re-running migrations must not duplicate roles");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn first_registration_through_the_services_is_super_admin() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let services = bootstrap.start().await?;

    let first = services
        .authenticator
        .register("organizer@example.org", "Runt1me!Pass", Some("Organizer"))
        .await?;
    let second = services
        .authenticator
        .register("volunteer@example.org", "Runt1me!Pass", None)
        .await?;
    assert!(first.granted_super_admin);
    assert!(!second.granted_super_admin);

    let super_admins: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_global_roles g JOIN roles r ON r.id = g.role_id WHERE r.name = 'SuperAdmin'",
    )
    .fetch_one(&services.db_pool)
    .await?;
    assert_eq!(super_admins, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn email_defaults_to_console_delivery() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let services = bootstrap.start().await?;

    assert_eq!(services.email.active_provider().await, EmailProviderKind::Console);
    let receipt = services
        .email
        .send_welcome("organizer@example.org", "Organizer")
        .await?;
    assert!(receipt.success);
    assert!(receipt.message_id.starts_with("console-"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn incomplete_mail_settings_fall_back_to_console() -> Result<()> {
    let mut bootstrap = Bootstrap::new()?;
    bootstrap.config.email.provider = EmailProviderKind::Smtp;
    bootstrap.config.email.smtp.host = None;
    let smtp = bootstrap.start().await?;
    assert_eq!(smtp.email.active_provider().await, EmailProviderKind::Console);

    bootstrap.config.email.provider = EmailProviderKind::Sendgrid;
    bootstrap.config.email.sendgrid.api_key = Some(String::new());
    let sendgrid = bootstrap.start().await?;
    assert_eq!(sendgrid.email.active_provider().await, EmailProviderKind::Console);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn social_login_follows_configured_credentials() -> Result<()> {
    let mut bootstrap = Bootstrap::new()?;
    bootstrap.config.auth.github.client_id = Some("gh-client".into());
    bootstrap.config.auth.github.client_secret = Some("gh-secret".into());
    let services = bootstrap.start().await?;

    assert!(services.authenticator.provider_enabled(SocialProvider::Github));
    assert!(!services.authenticator.provider_enabled(SocialProvider::Google));

    let url = services.authenticator.authorization_url(
        SocialProvider::Github,
        "state-1",
        "http://localhost:4000/auth/github/callback",
    )?;
    assert!(url.contains("client_id=gh-client"));

    let disabled = services.authenticator.authorization_url(
        SocialProvider::Google,
        "state-2",
        "http://localhost:4000/auth/google/callback",
    );
    assert!(matches!(
        disabled,
        Err(AuthError::ProviderDisabled(SocialProvider::Google))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_database_url_is_reported() -> Result<()> {
    let mut bootstrap = Bootstrap::new()?;
    bootstrap.config.database.url = "postgres://localhost/conducky".into();

    let error = match bootstrap.start().await {
        Ok(_) => panic!("only sqlite urls are supported"),
        Err(error) => format!("{error:#}"),
    };
    assert!(
        error.contains("failed to connect to database") || error.contains("invalid database url"),
        "unexpected error: {error}"
    );
    Ok(())
}

#[test]
fn telemetry_can_only_be_installed_once() {
    conducky_runtime::telemetry::init_tracing().expect("first initialisation should succeed");
    assert!(conducky_runtime::telemetry::init_tracing().is_err());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_signal_resolves_on_sigterm() -> Result<()> {
    let shutdown = tokio::spawn(conducky_runtime::shutdown_signal());

    sleep(Duration::from_millis(50)).await;
    unsafe {
        libc::raise(libc::SIGTERM);
    }

    timeout(Duration::from_secs(2), shutdown).await??;
    Ok(())
}
