use sqlx::SqlitePool;

use crate::entities::{EvidenceContent, EvidenceFile, NewEvidence};
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

#[derive(Clone)]
pub struct EvidenceRepository {
    pool: SqlitePool,
}

impl EvidenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store every file of one upload, or none of them.
    pub async fn create_many(
        &self,
        report_id: &str,
        uploader_id: &str,
        files: Vec<NewEvidence>,
    ) -> DatabaseResult<Vec<EvidenceFile>> {
        let mut tx = self.pool.begin().await?;
        let created_at = now();
        let mut stored = Vec::with_capacity(files.len());

        for file in files {
            if file.data.is_empty() {
                return Err(DatabaseError::Validation(format!(
                    "Evidence file {} is empty",
                    file.filename
                )));
            }

            let id = new_id();
            sqlx::query(
                "INSERT INTO evidence_files (id, report_id, uploader_id, filename, mime_type, size, data, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(report_id)
            .bind(uploader_id)
            .bind(&file.filename)
            .bind(&file.mime_type)
            .bind(file.data.len() as i64)
            .bind(&file.data)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            let evidence = sqlx::query_as::<_, EvidenceFile>(
                "SELECT id, report_id, uploader_id, filename, mime_type, size, created_at FROM evidence_files WHERE id = ?",
            )
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(evidence);
        }

        tx.commit().await?;
        Ok(stored)
    }

    pub async fn list_for_report(&self, report_id: &str) -> DatabaseResult<Vec<EvidenceFile>> {
        let files = sqlx::query_as::<_, EvidenceFile>(
            "SELECT id, report_id, uploader_id, filename, mime_type, size, created_at FROM evidence_files WHERE report_id = ? ORDER BY created_at, rowid",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    pub async fn content(
        &self,
        report_id: &str,
        evidence_id: &str,
    ) -> DatabaseResult<EvidenceContent> {
        sqlx::query_as::<_, EvidenceContent>(
            "SELECT filename, mime_type, data FROM evidence_files WHERE id = ? AND report_id = ?",
        )
        .bind(evidence_id)
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound("Evidence file"))
    }
}
