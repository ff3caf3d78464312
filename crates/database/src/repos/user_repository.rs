//! User repository for database operations.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;

use crate::entities::{ProfileUpdate, RoleName, User, UserWithRoles};
use crate::types::{now, DatabaseError, DatabaseResult};

/// Rows touched while removing a user and everything that hangs off them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub sessions: u64,
    pub reset_tokens: u64,
    pub social_accounts: u64,
    pub event_roles: u64,
    pub global_roles: u64,
    pub memberships: u64,
    pub notifications: u64,
    pub detached_records: u64,
}

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, avatar_url, password_hash, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, avatar_url, password_hash, created_at, updated_at FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get(&self, id: &str) -> DatabaseResult<User> {
        self.find_by_id(id).await?.ok_or(DatabaseError::NotFound("User"))
    }

    pub async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> DatabaseResult<User> {
        let result = sqlx::query(
            "UPDATE users SET name = COALESCE(?, name), avatar_url = COALESCE(?, avatar_url), updated_at = ? WHERE id = ?",
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.avatar_url.as_deref().map(str::trim))
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("User"));
        }
        self.get(id).await
    }

    pub async fn list_with_global_roles(&self) -> DatabaseResult<Vec<UserWithRoles>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, email, name, avatar_url, password_hash, created_at, updated_at FROM users ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let grants: Vec<(String, RoleName)> = sqlx::query_as(
            "SELECT ugr.user_id, r.name FROM user_global_roles ugr JOIN roles r ON r.id = ugr.role_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_user: HashMap<String, Vec<RoleName>> = HashMap::new();
        for (user_id, role) in grants {
            by_user.entry(user_id).or_default().push(role);
        }

        Ok(users
            .into_iter()
            .map(|user| {
                let global_roles = by_user.remove(&user.id).unwrap_or_default();
                UserWithRoles { user, global_roles }
            })
            .collect())
    }

    /// Remove a user in one transaction: owned rows are deleted, authorship on
    /// shared records is set to NULL.
    pub async fn delete_with_dependents(&self, id: &str) -> DatabaseResult<CleanupSummary> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DatabaseError::NotFound("User"));
        }

        let mut summary = CleanupSummary::default();
        let owned: [(&str, &mut u64); 7] = [
            ("DELETE FROM sessions WHERE user_id = ?", &mut summary.sessions),
            ("DELETE FROM password_reset_tokens WHERE user_id = ?", &mut summary.reset_tokens),
            ("DELETE FROM social_accounts WHERE user_id = ?", &mut summary.social_accounts),
            ("DELETE FROM user_event_roles WHERE user_id = ?", &mut summary.event_roles),
            ("DELETE FROM user_global_roles WHERE user_id = ?", &mut summary.global_roles),
            ("DELETE FROM organization_memberships WHERE user_id = ?", &mut summary.memberships),
            ("DELETE FROM notifications WHERE user_id = ?", &mut summary.notifications),
        ];
        for (statement, counter) in owned {
            *counter = sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        let detach = [
            "UPDATE reports SET reporter_id = NULL WHERE reporter_id = ?",
            "UPDATE reports SET assigned_responder_id = NULL WHERE assigned_responder_id = ?",
            "UPDATE report_comments SET author_id = NULL WHERE author_id = ?",
            "UPDATE evidence_files SET uploader_id = NULL WHERE uploader_id = ?",
            "UPDATE event_invite_links SET created_by = NULL WHERE created_by = ?",
            "UPDATE audit_logs SET user_id = NULL WHERE user_id = ?",
            "UPDATE organizations SET created_by = NULL WHERE created_by = ?",
        ];
        for statement in detach {
            summary.detached_records += sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(user_id = %id, ?summary, "user removed with dependents");
        Ok(summary)
    }
}
