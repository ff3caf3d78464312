use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, patch, post};
use axum::{Json, Router};
use conducky_database::Notification;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiResult, ErrorResponse};
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/api/notifications/:id/read", patch(mark_read))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id", delete(delete_notification))
}

#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/read",
    tag = "Notifications",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = Notification),
        (status = 404, description = "Not one of the caller's notifications", body = ErrorResponse)
    )
)]
pub async fn mark_read(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.notifications().mark_read(current.id(), &id).await?))
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    tag = "Notifications",
    responses(
        (status = 200, description = "Number of notifications marked read", body = MarkAllReadResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn mark_all_read(
    State(state): State<GatewayState>,
    current: CurrentUser,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated = state.notifications().mark_all_read(current.id()).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    tag = "Notifications",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Not one of the caller's notifications", body = ErrorResponse)
    )
)]
pub async fn delete_notification(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.notifications().delete(current.id(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
