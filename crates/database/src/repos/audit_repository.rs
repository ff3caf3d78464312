//! Audit trail for state-changing event operations.

use sqlx::SqlitePool;
use tracing::debug;

use crate::entities::{AuditEntry, AuditLog};
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

fn required(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Persist an audit entry exactly as given. `event_id`, `action`,
/// `target_type` and `target_id` must all be present and non-blank.
pub async fn log_audit(pool: &SqlitePool, entry: AuditEntry) -> DatabaseResult<AuditLog> {
    let (Some(event_id), Some(action), Some(target_type), Some(target_id)) = (
        required(entry.event_id),
        required(entry.action),
        required(entry.target_type),
        required(entry.target_id),
    ) else {
        return Err(DatabaseError::MissingRequiredFields);
    };

    let log = AuditLog {
        id: new_id(),
        event_id,
        user_id: entry.user_id,
        action,
        target_type,
        target_id,
        timestamp: now(),
    };

    sqlx::query(
        "INSERT INTO audit_logs (id, event_id, user_id, action, target_type, target_id, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&log.id)
    .bind(&log.event_id)
    .bind(&log.user_id)
    .bind(&log.action)
    .bind(&log.target_type)
    .bind(&log.target_id)
    .bind(&log.timestamp)
    .execute(pool)
    .await?;

    debug!(event_id = %log.event_id, action = %log.action, target = %log.target_id, "audit entry recorded");
    Ok(log)
}

#[derive(Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: AuditEntry) -> DatabaseResult<AuditLog> {
        log_audit(&self.pool, entry).await
    }

    pub async fn list_for_event(
        &self,
        event_id: &str,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            "SELECT id, event_id, user_id, action, target_type, target_id, timestamp FROM audit_logs \
             WHERE event_id = ? ORDER BY timestamp DESC, id LIMIT ? OFFSET ?",
        )
        .bind(event_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}
