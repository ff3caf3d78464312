//! Incident reports: intake, triage and assignment.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use conducky_database::{
    AuditEntry, Event, NewNotification, NewReport, NotificationPriority, Report, ReportFilter,
    ReportState, RoleName, MEMBERS, RESPONDERS,
};
use conducky_sanitize::sanitize_general;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::rate_limit::{throttled, RateLimitPolicy};
use crate::rbac::{event_access, guarded, EventAccess, EventScope};
use crate::rest::{notify, record_audit, Pagination};
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub description_html: String,
}

impl From<Report> for ReportDetail {
    fn from(report: Report) -> Self {
        Self {
            description_html: sanitize_general(&report.description),
            report,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportListQuery {
    pub state: Option<ReportState>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StateChange {
    pub state: ReportState,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentChange {
    #[serde(default)]
    pub assigned_responder_id: Option<String>,
}

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new()
        .route(
            "/api/events/slug/:slug/reports",
            throttled(
                guarded(post(create_report), state, MEMBERS),
                state,
                RateLimitPolicy::ReportCreation,
            )
            .merge(guarded(get(list_reports), state, RESPONDERS)),
        )
        .route(
            "/api/reports/:reportId",
            guarded(get(get_report), state, MEMBERS),
        )
        .route(
            "/api/reports/:reportId/state",
            guarded(patch(change_state), state, RESPONDERS),
        )
        .route(
            "/api/reports/:reportId/assignment",
            guarded(patch(change_assignment), state, RESPONDERS),
        )
}

/// A report together with the caller's standing in its event. Callers who
/// are neither the reporter nor a responder are refused.
pub(crate) async fn report_access(
    state: &GatewayState,
    current: &CurrentUser,
    report_id: &str,
) -> ApiResult<(Report, EventAccess)> {
    let report = state.reports().get(report_id).await?;
    let access = event_access(state, current.id(), &report.event_id).await?;
    let is_reporter = report.reporter_id.as_deref() == Some(current.id());
    if !is_reporter && !access.is_responder() {
        return Err(ApiError::forbidden("You do not have access to this report"));
    }
    Ok((report, access))
}

/// The report behind `report_id`, provided it belongs to the event the role
/// guard authorized.
async fn scoped_report(
    state: &GatewayState,
    scope: &EventScope,
    report_id: &str,
) -> ApiResult<Report> {
    let report = state.reports().get(report_id).await?;
    if report.event_id != scope.event_id {
        return Err(ApiError::not_found("Report not found"));
    }
    Ok(report)
}

pub(crate) fn report_url(event: &Event, report_id: &str) -> String {
    format!("/events/{}/reports/{}", event.slug, report_id)
}

#[utoipa::path(
    post,
    path = "/api/events/slug/{slug}/reports",
    tag = "Reports",
    params(("slug" = String, Path, description = "Event slug")),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report submitted", body = Report),
        (status = 400, description = "Missing title or description", body = ErrorResponse),
        (status = 403, description = "Not a member of the event", body = ErrorResponse),
        (status = 429, description = "Too many reports", body = ErrorResponse)
    )
)]
pub async fn create_report(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    ApiJson(payload): ApiJson<NewReport>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let report = state
        .reports()
        .create(&scope.event_id, current.id(), &payload)
        .await?;
    info!(report_id = %report.id, event_id = %scope.event_id, "report submitted");

    let event = state.events().get(&scope.event_id).await?;
    let recipients = state
        .roles()
        .event_user_ids_with_roles(&scope.event_id, &[RoleName::Responder, RoleName::Admin])
        .await?;
    let notifications = recipients
        .into_iter()
        .filter(|user_id| user_id != current.id())
        .map(|user_id| NewNotification {
            user_id,
            event_id: Some(event.id.clone()),
            report_id: Some(report.id.clone()),
            kind: "report_submitted",
            priority: NotificationPriority::High,
            title: "New report submitted".to_string(),
            message: format!("A new report \"{}\" was submitted to {}", report.title, event.name),
            action_url: Some(report_url(&event, &report.id)),
        })
        .collect();
    notify(&state, notifications).await;

    Ok((StatusCode::CREATED, Json(report)))
}

#[utoipa::path(
    get,
    path = "/api/events/slug/{slug}/reports",
    tag = "Reports",
    params(("slug" = String, Path, description = "Event slug"), ReportListQuery),
    responses(
        (status = 200, description = "Reports, newest first", body = [Report]),
        (status = 403, description = "Responders and admins only", body = ErrorResponse)
    )
)]
pub async fn list_reports(
    State(state): State<GatewayState>,
    scope: EventScope,
    Query(query): Query<ReportListQuery>,
) -> ApiResult<Json<Vec<Report>>> {
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };
    let filter = ReportFilter {
        state: query.state,
        limit: page.limit(),
        offset: page.offset(),
    };
    Ok(Json(
        state.reports().list_for_event(&scope.event_id, &filter).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/reports/{reportId}",
    tag = "Reports",
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report with rendered description", body = ReportDetail),
        (status = 403, description = "Neither the reporter nor a responder", body = ErrorResponse),
        (status = 404, description = "Report not found", body = ErrorResponse)
    )
)]
pub async fn get_report(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(report_id): Path<String>,
) -> ApiResult<Json<ReportDetail>> {
    let (report, _) = report_access(&state, &current, &report_id).await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    patch,
    path = "/api/reports/{reportId}/state",
    tag = "Reports",
    params(("reportId" = String, Path, description = "Report id")),
    request_body = StateChange,
    responses(
        (status = 200, description = "State changed", body = ReportDetail),
        (status = 400, description = "Transition not allowed", body = ErrorResponse),
        (status = 403, description = "Responders and admins only", body = ErrorResponse),
        (status = 404, description = "Report not found in the authorized event", body = ErrorResponse)
    )
)]
pub async fn change_state(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    Path(report_id): Path<String>,
    ApiJson(payload): ApiJson<StateChange>,
) -> ApiResult<Json<ReportDetail>> {
    let report = scoped_report(&state, &scope, &report_id).await?;
    let (previous, report) = state.reports().transition(&report.id, payload.state).await?;
    record_audit(
        &state,
        AuditEntry::new(
            &report.event_id,
            Some(current.user.id.clone()),
            format!("report.state.{}", report.state),
            "Report",
            &report.id,
        ),
    )
    .await;

    if let Some(reporter_id) = report
        .reporter_id
        .clone()
        .filter(|reporter| reporter != current.id())
    {
        let event = state.events().get(&report.event_id).await?;
        notify(
            &state,
            vec![NewNotification {
                user_id: reporter_id,
                event_id: Some(event.id.clone()),
                report_id: Some(report.id.clone()),
                kind: "report_status_changed",
                priority: NotificationPriority::Normal,
                title: "Report status updated".to_string(),
                message: format!(
                    "Your report \"{}\" moved from {} to {}",
                    report.title, previous, report.state
                ),
                action_url: Some(report_url(&event, &report.id)),
            }],
        )
        .await;
    }

    Ok(Json(report.into()))
}

#[utoipa::path(
    patch,
    path = "/api/reports/{reportId}/assignment",
    tag = "Reports",
    params(("reportId" = String, Path, description = "Report id")),
    request_body = AssignmentChange,
    responses(
        (status = 200, description = "Assignment updated", body = ReportDetail),
        (status = 400, description = "Assignee is not a responder of the event", body = ErrorResponse),
        (status = 403, description = "Responders and admins only", body = ErrorResponse),
        (status = 404, description = "Report not found in the authorized event", body = ErrorResponse)
    )
)]
pub async fn change_assignment(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    Path(report_id): Path<String>,
    ApiJson(payload): ApiJson<AssignmentChange>,
) -> ApiResult<Json<ReportDetail>> {
    let report = scoped_report(&state, &scope, &report_id).await?;
    let assignee = payload
        .assigned_responder_id
        .filter(|id| !id.trim().is_empty());

    if let Some(assignee) = assignee.as_deref() {
        let roles = state.roles().event_roles(assignee, &scope.event_id).await?;
        if !roles.iter().any(|role| role.is_responder()) {
            return Err(ApiError::bad_request(
                "Assignee must be a responder or admin of the event",
            ));
        }
    }

    let report = state.reports().assign(&report.id, assignee.as_deref()).await?;
    let action = if assignee.is_some() {
        "report.assigned"
    } else {
        "report.unassigned"
    };
    record_audit(
        &state,
        AuditEntry::new(
            &report.event_id,
            Some(current.user.id.clone()),
            action,
            "Report",
            &report.id,
        ),
    )
    .await;

    if let Some(assignee) = assignee.filter(|id| id != current.id()) {
        let event = state.events().get(&report.event_id).await?;
        notify(
            &state,
            vec![NewNotification {
                user_id: assignee,
                event_id: Some(event.id.clone()),
                report_id: Some(report.id.clone()),
                kind: "report_assigned",
                priority: NotificationPriority::High,
                title: "Report assigned to you".to_string(),
                message: format!("You have been assigned the report \"{}\"", report.title),
                action_url: Some(report_url(&event, &report.id)),
            }],
        )
        .await;
    }

    Ok(Json(report.into()))
}
