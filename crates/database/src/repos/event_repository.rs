//! Event repository.

use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::entities::{Event, EventUpdate, NewEvent, RoleName, UserEventSummary};
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

macro_rules! event_select {
    () => {
        "SELECT id, name, slug, description, code_of_conduct, contact_email, organization_id, created_at, updated_at FROM events"
    };
}

/// Slugs are 3-64 characters of lowercase letters, digits and dashes.
pub fn validate_slug(slug: &str) -> DatabaseResult<()> {
    let valid_length = (3..=64).contains(&slug.len());
    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid_length && valid_chars {
        Ok(())
    } else {
        Err(DatabaseError::Validation(
            "Slug must be 3-64 characters of lowercase letters, numbers and dashes".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &NewEvent) -> DatabaseResult<Event> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DatabaseError::Validation("Event name is required".to_string()));
        }
        validate_slug(&request.slug)?;

        if let Some(organization_id) = request.organization_id.as_deref() {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT id FROM organizations WHERE id = ?")
                    .bind(organization_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                return Err(DatabaseError::NotFound("Organization"));
            }
        }

        let id = new_id();
        let timestamp = now();
        sqlx::query(
            "INSERT INTO events (id, name, slug, description, organization_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(&request.slug)
        .bind(&request.description)
        .bind(&request.organization_id)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await
        .map_err(|err| DatabaseError::conflict_or(err, "Event slug already exists"))?;

        self.get(&id).await
    }

    pub async fn list(&self) -> DatabaseResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(concat!(event_select!(), " ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    pub async fn list_for_organization(&self, organization_id: &str) -> DatabaseResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(concat!(
            event_select!(),
            " WHERE organization_id = ? ORDER BY name"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(concat!(event_select!(), " WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    pub async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(concat!(event_select!(), " WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    pub async fn get(&self, id: &str) -> DatabaseResult<Event> {
        self.find_by_id(id).await?.ok_or(DatabaseError::NotFound("Event"))
    }

    pub async fn id_for_slug(&self, slug: &str) -> DatabaseResult<Option<String>> {
        let id = sqlx::query_scalar("SELECT id FROM events WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn update(&self, id: &str, update: &EventUpdate) -> DatabaseResult<Event> {
        if let Some(name) = update.name.as_deref() {
            if name.trim().is_empty() {
                return Err(DatabaseError::Validation("Event name cannot be empty".to_string()));
            }
        }

        let result = sqlx::query(
            "UPDATE events SET name = COALESCE(?, name), description = COALESCE(?, description), \
             code_of_conduct = COALESCE(?, code_of_conduct), contact_email = COALESCE(?, contact_email), \
             updated_at = ? WHERE id = ?",
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(&update.code_of_conduct)
        .bind(update.contact_email.as_deref().map(str::trim))
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Event"));
        }
        self.get(id).await
    }

    /// Events in which the user holds at least one role, with those roles.
    pub async fn events_for_user(&self, user_id: &str) -> DatabaseResult<Vec<UserEventSummary>> {
        let events = sqlx::query_as::<_, Event>(concat!(
            event_select!(),
            " WHERE id IN (SELECT event_id FROM user_event_roles WHERE user_id = ?) ORDER BY name"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let grants: Vec<(String, RoleName)> = sqlx::query_as(
            "SELECT uer.event_id, r.name FROM user_event_roles uer JOIN roles r ON r.id = uer.role_id WHERE uer.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut roles_by_event: HashMap<String, Vec<RoleName>> = HashMap::new();
        for (event_id, role) in grants {
            roles_by_event.entry(event_id).or_default().push(role);
        }

        Ok(events
            .into_iter()
            .map(|event| {
                let roles = roles_by_event.remove(&event.id).unwrap_or_default();
                UserEventSummary { event, roles }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::validate_slug;

    #[test]
    fn slug_rules() {
        assert!(validate_slug("devconf-2025").is_ok());
        assert!(validate_slug("ab").is_err());
        assert!(validate_slug("Upper-Case").is_err());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug(&"a".repeat(65)).is_err());
    }
}
