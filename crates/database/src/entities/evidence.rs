use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Evidence metadata; the blob itself is only loaded for downloads.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub id: String,
    pub report_id: String,
    pub uploader_id: Option<String>,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct EvidenceContent {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}
