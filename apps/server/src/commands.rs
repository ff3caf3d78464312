//! Operator commands that act directly on the database.

use anyhow::{bail, Context};
use conducky_database::{CleanupSummary, RoleName, RoleRepository, UserRepository};
use sqlx::SqlitePool;
use tracing::info;

async fn user_id_for(pool: &SqlitePool, email: &str) -> anyhow::Result<String> {
    let email = email.trim().to_lowercase();
    let user = UserRepository::new(pool.clone())
        .find_by_email(&email)
        .await
        .context("failed to look up user")?;
    match user {
        Some(user) => Ok(user.id),
        None => bail!("no user registered with email {email}"),
    }
}

/// Returns `false` when the user already held the role.
pub async fn grant_super_admin(pool: &SqlitePool, email: &str) -> anyhow::Result<bool> {
    let user_id = user_id_for(pool, email).await?;
    let granted = RoleRepository::new(pool.clone())
        .grant_global(&user_id, RoleName::SuperAdmin)
        .await
        .context("failed to grant SuperAdmin")?;
    info!(%user_id, granted, "super admin grant processed");
    Ok(granted)
}

pub async fn cleanup_user(pool: &SqlitePool, email: &str) -> anyhow::Result<CleanupSummary> {
    let user_id = user_id_for(pool, email).await?;
    let summary = UserRepository::new(pool.clone())
        .delete_with_dependents(&user_id)
        .await
        .context("failed to remove user")?;
    info!(%user_id, ?summary, "user removed");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conducky_auth::Authenticator;
    use conducky_config::{AuthConfig, DatabaseConfig};
    use conducky_database::initialize_database;
    use tempfile::TempDir;

    async fn setup() -> (SqlitePool, Authenticator, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", temp_dir.path().join("cli.db").display()),
            ..DatabaseConfig::default()
        };
        let pool = initialize_database(&config).await.expect("database");
        let authenticator = Authenticator::new(pool.clone(), AuthConfig::default());
        (pool, authenticator, temp_dir)
    }

    #[tokio::test]
    async fn grant_super_admin_is_idempotent() {
        let (pool, auth, _dir) = setup().await;
        auth.register("first@example.org", "Corr3ct!Horse", None)
            .await
            .expect("first user");
        let second = auth
            .register("second@example.org", "Corr3ct!Horse", None)
            .await
            .expect("second user");
        assert!(!second.granted_super_admin);

        assert!(grant_super_admin(&pool, "Second@Example.org").await.unwrap());
        assert!(!grant_super_admin(&pool, "second@example.org").await.unwrap());
        let is_super_admin = RoleRepository::new(pool.clone())
            .is_super_admin(&second.user.id)
            .await
            .unwrap();
        assert!(is_super_admin);
    }

    #[tokio::test]
    async fn cleanup_user_removes_account_and_sessions() {
        let (pool, auth, _dir) = setup().await;
        let registration = auth
            .register("gone@example.org", "Corr3ct!Horse", Some("Gone"))
            .await
            .expect("register");

        let summary = cleanup_user(&pool, "gone@example.org").await.unwrap();
        assert_eq!(summary.sessions, 1);
        assert_eq!(summary.global_roles, 1);

        let user = UserRepository::new(pool.clone())
            .find_by_id(&registration.user.id)
            .await
            .unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn unknown_email_is_an_error() {
        let (pool, _auth, _dir) = setup().await;
        let error = cleanup_user(&pool, "nobody@example.org").await.unwrap_err();
        assert!(error.to_string().contains("no user registered"));
    }
}
