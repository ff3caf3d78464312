use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReportType {
    Harassment,
    Safety,
    Other,
}

/// Lifecycle of a report, from intake to closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReportState {
    Submitted,
    Acknowledged,
    Investigating,
    Resolved,
    Closed,
}

impl ReportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportState::Submitted => "submitted",
            ReportState::Acknowledged => "acknowledged",
            ReportState::Investigating => "investigating",
            ReportState::Resolved => "resolved",
            ReportState::Closed => "closed",
        }
    }

    /// Whether a report in this state may move to `next`.
    pub fn can_transition_to(self, next: ReportState) -> bool {
        use ReportState::*;

        matches!(
            (self, next),
            (Submitted, Acknowledged)
                | (Acknowledged, Investigating)
                | (Acknowledged | Investigating, Resolved)
                | (Submitted | Acknowledged | Investigating | Resolved, Closed)
                | (Closed, Investigating)
        )
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub event_id: String,
    pub reporter_id: Option<String>,
    pub assigned_responder_id: Option<String>,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub title: String,
    pub description: String,
    pub state: ReportState,
    pub incident_at: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub title: String,
    pub description: String,
    pub incident_at: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub state: Option<ReportState>,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::ReportState::*;

    #[test]
    fn forward_path_is_allowed() {
        assert!(Submitted.can_transition_to(Acknowledged));
        assert!(Acknowledged.can_transition_to(Investigating));
        assert!(Investigating.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Closed));
    }

    #[test]
    fn shortcuts_and_reopen_are_allowed() {
        assert!(Acknowledged.can_transition_to(Resolved));
        assert!(Submitted.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Investigating));
    }

    #[test]
    fn illegal_moves_are_rejected() {
        assert!(!Submitted.can_transition_to(Resolved));
        assert!(!Submitted.can_transition_to(Investigating));
        assert!(!Resolved.can_transition_to(Submitted));
        assert!(!Closed.can_transition_to(Submitted));
        assert!(!Closed.can_transition_to(Closed));
        assert!(!Investigating.can_transition_to(Acknowledged));
    }
}
