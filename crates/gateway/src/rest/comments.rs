//! Report comments. Internal comments stay between responders.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use conducky_database::{
    Comment, CommentVisibility, NewComment, NewNotification, NotificationPriority, Report,
    RoleName, MEMBERS,
};
use conducky_sanitize::sanitize_comment;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::rate_limit::{throttled, RateLimitPolicy};
use crate::rbac::guarded;
use crate::rest::notify;
use crate::rest::reports::{report_access, report_url};
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub body_html: String,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            body_html: sanitize_comment(&comment.body),
            comment,
        }
    }
}

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new().route(
        "/api/reports/:reportId/comments",
        throttled(
            guarded(post(create_comment), state, MEMBERS),
            state,
            RateLimitPolicy::Comment,
        )
        .merge(guarded(get(list_comments), state, MEMBERS)),
    )
}

#[utoipa::path(
    post,
    path = "/api/reports/{reportId}/comments",
    tag = "Comments",
    params(("reportId" = String, Path, description = "Report id")),
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment posted", body = CommentView),
        (status = 400, description = "Empty or oversized body", body = ErrorResponse),
        (status = 403, description = "Not allowed to comment or to post internally", body = ErrorResponse),
        (status = 429, description = "Too many comments", body = ErrorResponse)
    )
)]
pub async fn create_comment(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(report_id): Path<String>,
    ApiJson(payload): ApiJson<NewComment>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    let (report, access) = report_access(&state, &current, &report_id).await?;
    if payload.visibility == CommentVisibility::Internal && !access.is_responder() {
        return Err(ApiError::forbidden(
            "Only responders and admins can post internal comments",
        ));
    }

    let comment = state
        .comments()
        .create(&report.id, current.id(), &payload)
        .await?;

    let recipients = comment_recipients(&state, &report, &comment, current.id()).await?;
    if !recipients.is_empty() {
        let event = state.events().get(&report.event_id).await?;
        let notifications = recipients
            .into_iter()
            .map(|user_id| NewNotification {
                user_id,
                event_id: Some(event.id.clone()),
                report_id: Some(report.id.clone()),
                kind: "report_comment_added",
                priority: NotificationPriority::Normal,
                title: "New comment on report".to_string(),
                message: format!("A new comment was added to \"{}\"", report.title),
                action_url: Some(report_url(&event, &report.id)),
            })
            .collect();
        notify(&state, notifications).await;
    }

    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// The other party of a comment: responders hear from the reporter, the
/// reporter hears public replies. Internal notes only reach the assignee.
async fn comment_recipients(
    state: &GatewayState,
    report: &Report,
    comment: &Comment,
    author_id: &str,
) -> ApiResult<Vec<String>> {
    let mut recipients = Vec::new();
    let from_reporter = report.reporter_id.as_deref() == Some(author_id);

    if from_reporter {
        match &report.assigned_responder_id {
            Some(assignee) => recipients.push(assignee.clone()),
            None => {
                recipients = state
                    .roles()
                    .event_user_ids_with_roles(&report.event_id, &[RoleName::Responder, RoleName::Admin])
                    .await?;
            }
        }
    } else if comment.visibility == CommentVisibility::Public {
        recipients.extend(report.reporter_id.clone());
    } else {
        recipients.extend(report.assigned_responder_id.clone());
    }

    recipients.retain(|user_id| user_id != author_id);
    recipients.sort();
    recipients.dedup();
    Ok(recipients)
}

#[utoipa::path(
    get,
    path = "/api/reports/{reportId}/comments",
    tag = "Comments",
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Comments in posting order", body = [CommentView]),
        (status = 403, description = "Neither the reporter nor a responder", body = ErrorResponse)
    )
)]
pub async fn list_comments(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(report_id): Path<String>,
) -> ApiResult<Json<Vec<CommentView>>> {
    let (report, access) = report_access(&state, &current, &report_id).await?;
    let comments = state
        .comments()
        .list_for_report(&report.id, access.is_responder())
        .await?;
    Ok(Json(comments.into_iter().map(CommentView::from).collect()))
}
