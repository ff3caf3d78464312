use sqlx::SqlitePool;

use crate::entities::{Comment, NewComment};
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

macro_rules! comment_select {
    () => {
        "SELECT c.id, c.report_id, c.author_id, u.name AS author_name, c.body, c.visibility, c.created_at, c.updated_at \
         FROM report_comments c LEFT JOIN users u ON u.id = c.author_id"
    };
}

const MAX_BODY_LENGTH: usize = 10_000;

#[derive(Clone)]
pub struct CommentRepository {
    pool: SqlitePool,
}

impl CommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        report_id: &str,
        author_id: &str,
        request: &NewComment,
    ) -> DatabaseResult<Comment> {
        let body = request.body.trim();
        if body.is_empty() || body.chars().count() > MAX_BODY_LENGTH {
            return Err(DatabaseError::Validation(format!(
                "Comment body must be between 1 and {MAX_BODY_LENGTH} characters"
            )));
        }

        let id = new_id();
        let created_at = now();
        sqlx::query(
            "INSERT INTO report_comments (id, report_id, author_id, body, visibility, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(report_id)
        .bind(author_id)
        .bind(body)
        .bind(request.visibility)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        let comment = sqlx::query_as::<_, Comment>(concat!(comment_select!(), " WHERE c.id = ?"))
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;
        Ok(comment)
    }

    /// Comments in creation order; internal ones only when `include_internal`.
    pub async fn list_for_report(
        &self,
        report_id: &str,
        include_internal: bool,
    ) -> DatabaseResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(concat!(
            comment_select!(),
            " WHERE c.report_id = ? AND (? OR c.visibility = 'public') ORDER BY c.created_at, c.id"
        ))
        .bind(report_id)
        .bind(include_internal)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }
}
