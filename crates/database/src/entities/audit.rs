use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: String,
    pub event_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub timestamp: String,
}

/// Input for `log_audit`. Every field except `user_id` is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub event_id: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
}

impl AuditEntry {
    pub fn new(
        event_id: impl Into<String>,
        user_id: Option<String>,
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Some(event_id.into()),
            user_id,
            action: Some(action.into()),
            target_type: Some(target_type.into()),
            target_id: Some(target_id.into()),
        }
    }
}
