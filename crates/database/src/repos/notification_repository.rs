//! Notification repository. Every read or write is scoped to the owning user.

use sqlx::SqlitePool;

use crate::entities::{NewNotification, Notification};
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

macro_rules! notification_select {
    () => {
        "SELECT id, user_id, event_id, report_id, kind, priority, title, message, action_url, is_read, read_at, created_at FROM notifications"
    };
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a batch in one transaction, returning the number written.
    pub async fn create_many(&self, notifications: &[NewNotification]) -> DatabaseResult<usize> {
        if notifications.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let created_at = now();
        for notification in notifications {
            sqlx::query(
                "INSERT INTO notifications (id, user_id, event_id, report_id, kind, priority, title, message, action_url, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(&notification.user_id)
            .bind(&notification.event_id)
            .bind(&notification.report_id)
            .bind(notification.kind)
            .bind(notification.priority)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.action_url)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(notifications.len())
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(concat!(
            notification_select!(),
            " WHERE user_id = ? AND (? = 0 OR is_read = 0) ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: &str) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, user_id: &str, id: &str) -> DatabaseResult<Notification> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?",
        )
        .bind(now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Notification"));
        }

        let notification =
            sqlx::query_as::<_, Notification>(concat!(notification_select!(), " WHERE id = ?"))
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE user_id = ? AND is_read = 0",
        )
        .bind(now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Notification"));
        }
        Ok(())
    }
}
