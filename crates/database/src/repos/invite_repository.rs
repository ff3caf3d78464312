//! Event invite links and their redemption.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::entities::{EventInvite, InvitePreview, NewInvite, RoleName};
use crate::types::{new_id, now, parse_timestamp, timestamp, DatabaseError, DatabaseResult};

macro_rules! invite_select {
    () => {
        "SELECT i.id, i.event_id, i.code, r.name AS role_name, i.created_by, i.max_uses, i.use_count, \
         i.expires_at, i.disabled, i.note, i.created_at FROM event_invite_links i JOIN roles r ON r.id = i.role_id"
    };
}

#[derive(Clone)]
pub struct InviteRepository {
    pool: SqlitePool,
}

impl InviteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        event_id: &str,
        created_by: &str,
        request: &NewInvite,
    ) -> DatabaseResult<EventInvite> {
        if request.role_name == RoleName::SuperAdmin {
            return Err(DatabaseError::Validation(
                "SuperAdmin cannot be granted through an invite".to_string(),
            ));
        }
        if matches!(request.max_uses, Some(uses) if uses < 1) {
            return Err(DatabaseError::Validation("maxUses must be at least 1".to_string()));
        }
        let expires_at = match request.expires_at.as_deref() {
            Some(raw) => {
                let parsed = parse_timestamp(raw).ok_or_else(|| {
                    DatabaseError::Validation("expiresAt must be an RFC 3339 timestamp".to_string())
                })?;
                if parsed <= Utc::now() {
                    return Err(DatabaseError::Validation("expiresAt must be in the future".to_string()));
                }
                Some(timestamp(parsed))
            }
            None => None,
        };

        let id = new_id();
        sqlx::query(
            "INSERT INTO event_invite_links (id, event_id, code, role_id, created_by, max_uses, expires_at, note, created_at) \
             SELECT ?, ?, ?, id, ?, ?, ?, ?, ? FROM roles WHERE name = ?",
        )
        .bind(&id)
        .bind(event_id)
        .bind(new_id())
        .bind(created_by)
        .bind(request.max_uses)
        .bind(expires_at)
        .bind(request.note.as_deref().map(str::trim))
        .bind(now())
        .bind(request.role_name.as_str())
        .execute(&self.pool)
        .await?;

        self.find_by_id(event_id, &id)
            .await?
            .ok_or(DatabaseError::NotFound("Invite"))
    }

    pub async fn list_for_event(&self, event_id: &str) -> DatabaseResult<Vec<EventInvite>> {
        let invites = sqlx::query_as::<_, EventInvite>(concat!(
            invite_select!(),
            " WHERE i.event_id = ? ORDER BY i.created_at DESC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(invites)
    }

    pub async fn find_by_id(&self, event_id: &str, id: &str) -> DatabaseResult<Option<EventInvite>> {
        let invite = sqlx::query_as::<_, EventInvite>(concat!(
            invite_select!(),
            " WHERE i.id = ? AND i.event_id = ?"
        ))
        .bind(id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invite)
    }

    pub async fn find_by_code(&self, code: &str) -> DatabaseResult<Option<EventInvite>> {
        let invite = sqlx::query_as::<_, EventInvite>(concat!(invite_select!(), " WHERE i.code = ?"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invite)
    }

    pub async fn set_disabled(
        &self,
        event_id: &str,
        id: &str,
        disabled: bool,
    ) -> DatabaseResult<EventInvite> {
        let result = sqlx::query("UPDATE event_invite_links SET disabled = ? WHERE id = ? AND event_id = ?")
            .bind(disabled)
            .bind(id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Invite"));
        }
        self.find_by_id(event_id, id)
            .await?
            .ok_or(DatabaseError::NotFound("Invite"))
    }

    pub async fn preview(&self, code: &str) -> DatabaseResult<InvitePreview> {
        let invite = self
            .find_by_code(code)
            .await?
            .ok_or(DatabaseError::NotFound("Invite"))?;

        let (event_name, event_slug): (String, String) =
            sqlx::query_as("SELECT name, slug FROM events WHERE id = ?")
                .bind(&invite.event_id)
                .fetch_one(&self.pool)
                .await?;

        let reason = invite.unusable_reason(Utc::now());
        Ok(InvitePreview {
            event_name,
            event_slug,
            role_name: invite.role_name,
            valid: reason.is_none(),
            reason: reason.map(str::to_string),
        })
    }

    /// Grant the invite's role to `user_id` and count the use, atomically.
    pub async fn redeem(&self, code: &str, user_id: &str) -> DatabaseResult<EventInvite> {
        let mut tx = self.pool.begin().await?;

        let invite = sqlx::query_as::<_, EventInvite>(concat!(invite_select!(), " WHERE i.code = ?"))
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DatabaseError::NotFound("Invite"))?;

        if let Some(reason) = invite.unusable_reason(Utc::now()) {
            return Err(DatabaseError::Validation(reason.to_string()));
        }

        sqlx::query(
            "INSERT INTO user_event_roles (id, user_id, event_id, role_id, created_at) SELECT ?, ?, ?, id, ? FROM roles WHERE name = ?",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(&invite.event_id)
        .bind(now())
        .bind(invite.role_name.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|err| DatabaseError::conflict_or(err, "You already have this role for the event"))?;

        let counted = sqlx::query(
            "UPDATE event_invite_links SET use_count = use_count + 1 WHERE id = ? AND (max_uses IS NULL OR use_count < max_uses)",
        )
        .bind(&invite.id)
        .execute(&mut *tx)
        .await?;
        if counted.rows_affected() == 0 {
            return Err(DatabaseError::Validation(
                "Invite link has reached its maximum uses".to_string(),
            ));
        }

        tx.commit().await?;

        info!(invite_id = %invite.id, event_id = %invite.event_id, user_id, role = %invite.role_name, "invite redeemed");
        Ok(EventInvite {
            use_count: invite.use_count + 1,
            ..invite
        })
    }
}
