//! Global grants and event-scoped role memberships.

use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::entities::{EventMember, RoleName};
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

#[derive(Clone)]
pub struct RoleRepository {
    pool: SqlitePool,
}

impl RoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn global_roles(&self, user_id: &str) -> DatabaseResult<Vec<RoleName>> {
        let roles = sqlx::query_scalar::<_, RoleName>(
            "SELECT r.name FROM user_global_roles ugr JOIN roles r ON r.id = ugr.role_id WHERE ugr.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    pub async fn is_super_admin(&self, user_id: &str) -> DatabaseResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_global_roles ugr JOIN roles r ON r.id = ugr.role_id WHERE ugr.user_id = ? AND r.name = 'SuperAdmin'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Grant a global role. Granting an existing role is a no-op; returns whether a row was added.
    pub async fn grant_global(&self, user_id: &str, role: RoleName) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_global_roles (user_id, role_id, created_at) SELECT ?, id, ? FROM roles WHERE name = ?",
        )
        .bind(user_id)
        .bind(now())
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn event_roles(&self, user_id: &str, event_id: &str) -> DatabaseResult<Vec<RoleName>> {
        let roles = sqlx::query_scalar::<_, RoleName>(
            "SELECT r.name FROM user_event_roles uer JOIN roles r ON r.id = uer.role_id WHERE uer.user_id = ? AND uer.event_id = ? ORDER BY r.name",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    /// Whether the user holds any of `allowed` within the event.
    pub async fn has_any_event_role(
        &self,
        user_id: &str,
        event_id: &str,
        allowed: &[RoleName],
    ) -> DatabaseResult<bool> {
        if allowed.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM user_event_roles uer JOIN roles r ON r.id = uer.role_id \
             WHERE uer.user_id = ? AND uer.event_id = ? AND r.name IN ({placeholders})"
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(user_id).bind(event_id);
        for role in allowed {
            query = query.bind(role.as_str());
        }

        Ok(query.fetch_one(&self.pool).await? > 0)
    }

    pub async fn assign_event_role(
        &self,
        user_id: &str,
        event_id: &str,
        role: RoleName,
    ) -> DatabaseResult<()> {
        if role == RoleName::SuperAdmin {
            return Err(DatabaseError::Validation(
                "SuperAdmin cannot be assigned per event".to_string(),
            ));
        }

        let user: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        if user.is_none() {
            return Err(DatabaseError::NotFound("User"));
        }

        sqlx::query(
            "INSERT INTO user_event_roles (id, user_id, event_id, role_id, created_at) SELECT ?, ?, ?, id, ? FROM roles WHERE name = ?",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(event_id)
        .bind(now())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| DatabaseError::conflict_or(err, "User already has this role for the event"))?;

        Ok(())
    }

    pub async fn remove_event_role(
        &self,
        user_id: &str,
        event_id: &str,
        role: RoleName,
    ) -> DatabaseResult<()> {
        let result = sqlx::query(
            "DELETE FROM user_event_roles WHERE user_id = ? AND event_id = ? AND role_id = (SELECT id FROM roles WHERE name = ?)",
        )
        .bind(user_id)
        .bind(event_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Role assignment"));
        }
        Ok(())
    }

    pub async fn event_members(&self, event_id: &str) -> DatabaseResult<Vec<EventMember>> {
        let rows: Vec<(String, String, Option<String>, RoleName)> = sqlx::query_as(
            "SELECT u.id, u.email, u.name, r.name FROM user_event_roles uer \
             JOIN users u ON u.id = uer.user_id JOIN roles r ON r.id = uer.role_id \
             WHERE uer.event_id = ? ORDER BY u.email",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let mut members: BTreeMap<String, EventMember> = BTreeMap::new();
        for (user_id, email, name, role) in rows {
            members
                .entry(email.clone())
                .or_insert_with(|| EventMember {
                    user_id,
                    email,
                    name,
                    roles: Vec::new(),
                })
                .roles
                .push(role);
        }
        Ok(members.into_values().collect())
    }

    /// Users holding any of `roles` in the event, used to fan out notifications.
    pub async fn event_user_ids_with_roles(
        &self,
        event_id: &str,
        roles: &[RoleName],
    ) -> DatabaseResult<Vec<String>> {
        let members = self.event_members(event_id).await?;
        Ok(members
            .into_iter()
            .filter(|member| member.roles.iter().any(|role| roles.contains(role)))
            .map(|member| member.user_id)
            .collect())
    }
}
