//! Endpoints scoped to the calling user.

use axum::extract::{Query, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use conducky_auth::AuthError;
use conducky_database::{
    Notification, ProfileUpdate, Report, UserEventSummary, UserWithRoles,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::rest::{MessageResponse, Pagination};
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/api/users/me", get(get_me).patch(update_me))
        .route("/api/users/me/password", patch(change_password))
        .route("/api/users/me/events", get(my_events))
        .route("/api/users/me/reports", get(my_reports))
        .route("/api/users/me/notifications", get(my_notifications))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Profile with global roles", body = UserWithRoles),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn get_me(
    State(state): State<GatewayState>,
    current: CurrentUser,
) -> ApiResult<Json<UserWithRoles>> {
    let global_roles = state.roles().global_roles(current.id()).await?;
    Ok(Json(UserWithRoles {
        user: current.user,
        global_roles,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "Users",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserWithRoles),
        (status = 400, description = "Invalid profile fields", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn update_me(
    State(state): State<GatewayState>,
    current: CurrentUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<UserWithRoles>> {
    let user = state.users().update_profile(current.id(), &update).await?;
    let global_roles = state.roles().global_roles(&user.id).await?;
    Ok(Json(UserWithRoles { user, global_roles }))
}

#[utoipa::path(
    patch,
    path = "/api/users/me/password",
    tag = "Users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password or weak new password", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn change_password(
    State(state): State<GatewayState>,
    current: CurrentUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .authenticator()
        .change_password(current.id(), &payload.current_password, &payload.new_password)
        .await
        .map_err(|error| match error {
            AuthError::InvalidCredentials => ApiError::bad_request("Current password is incorrect"),
            other => ApiError::from(other),
        })?;
    Ok(Json(MessageResponse::new("Password updated")))
}

#[utoipa::path(
    get,
    path = "/api/users/me/events",
    tag = "Users",
    responses(
        (status = 200, description = "Events the caller belongs to, with roles", body = [UserEventSummary]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn my_events(
    State(state): State<GatewayState>,
    current: CurrentUser,
) -> ApiResult<Json<Vec<UserEventSummary>>> {
    Ok(Json(state.events().events_for_user(current.id()).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/me/reports",
    tag = "Users",
    responses(
        (status = 200, description = "Reports the caller submitted", body = [Report]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn my_reports(
    State(state): State<GatewayState>,
    current: CurrentUser,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.reports().list_for_reporter(current.id()).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/me/notifications",
    tag = "Notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications, newest first", body = NotificationList),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn my_notifications(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<NotificationList>> {
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };
    let repo = state.notifications();
    let notifications = repo
        .list_for_user(current.id(), query.unread_only, page.limit(), page.offset())
        .await?;
    let unread_count = repo.unread_count(current.id()).await?;
    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}
