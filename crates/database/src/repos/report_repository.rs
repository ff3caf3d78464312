//! Report repository and the report state machine.

use sqlx::SqlitePool;
use tracing::debug;

use crate::entities::{NewReport, Report, ReportFilter, ReportState};
use crate::types::{new_id, now, parse_timestamp, timestamp, DatabaseError, DatabaseResult};

macro_rules! report_select {
    () => {
        "SELECT id, event_id, reporter_id, assigned_responder_id, report_type, title, description, state, incident_at, location, created_at, updated_at FROM reports"
    };
}

const MAX_TITLE_LENGTH: usize = 200;

#[derive(Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        event_id: &str,
        reporter_id: &str,
        request: &NewReport,
    ) -> DatabaseResult<Report> {
        let title = request.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
            return Err(DatabaseError::Validation(format!(
                "Title must be between 1 and {MAX_TITLE_LENGTH} characters"
            )));
        }
        if request.description.trim().is_empty() {
            return Err(DatabaseError::Validation("Description is required".to_string()));
        }
        let incident_at = match request.incident_at.as_deref() {
            Some(raw) => Some(
                parse_timestamp(raw)
                    .map(timestamp)
                    .ok_or_else(|| DatabaseError::Validation("incidentAt must be an RFC 3339 timestamp".to_string()))?,
            ),
            None => None,
        };

        let id = new_id();
        let created_at = now();
        sqlx::query(
            "INSERT INTO reports (id, event_id, reporter_id, report_type, title, description, state, incident_at, location, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(event_id)
        .bind(reporter_id)
        .bind(request.report_type)
        .bind(title)
        .bind(&request.description)
        .bind(ReportState::Submitted)
        .bind(incident_at)
        .bind(request.location.as_deref().map(str::trim))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    pub async fn find(&self, id: &str) -> DatabaseResult<Option<Report>> {
        let report = sqlx::query_as::<_, Report>(concat!(report_select!(), " WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> DatabaseResult<Report> {
        self.find(id).await?.ok_or(DatabaseError::NotFound("Report"))
    }

    pub async fn event_id_for(&self, report_id: &str) -> DatabaseResult<Option<String>> {
        let event_id = sqlx::query_scalar("SELECT event_id FROM reports WHERE id = ?")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event_id)
    }

    pub async fn list_for_event(
        &self,
        event_id: &str,
        filter: &ReportFilter,
    ) -> DatabaseResult<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(concat!(
            report_select!(),
            " WHERE event_id = ? AND (? IS NULL OR state = ?) ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(event_id)
        .bind(filter.state)
        .bind(filter.state)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(reports)
    }

    pub async fn list_for_reporter(&self, reporter_id: &str) -> DatabaseResult<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(concat!(
            report_select!(),
            " WHERE reporter_id = ? ORDER BY created_at DESC"
        ))
        .bind(reporter_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reports)
    }

    /// Move a report to `next`, returning the previous state and the updated row.
    pub async fn transition(
        &self,
        id: &str,
        next: ReportState,
    ) -> DatabaseResult<(ReportState, Report)> {
        let current = self.get(id).await?;
        if !current.state.can_transition_to(next) {
            return Err(DatabaseError::InvalidTransition {
                from: current.state,
                to: next,
            });
        }

        let result = sqlx::query("UPDATE reports SET state = ?, updated_at = ? WHERE id = ? AND state = ?")
            .bind(next)
            .bind(now())
            .bind(id)
            .bind(current.state)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Conflict(
                "Report state changed while updating; reload and retry".to_string(),
            ));
        }

        debug!(report_id = %id, from = %current.state, to = %next, "report state changed");
        Ok((current.state, self.get(id).await?))
    }

    pub async fn assign(&self, id: &str, responder_id: Option<&str>) -> DatabaseResult<Report> {
        let result = sqlx::query("UPDATE reports SET assigned_responder_id = ?, updated_at = ? WHERE id = ?")
            .bind(responder_id)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Report"));
        }
        self.get(id).await
    }
}
