//! Event administration and membership.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use conducky_database::{
    AuditEntry, AuditLog, Event, EventMember, EventUpdate, NewEvent, RoleName, ADMINS, MEMBERS,
    RESPONDERS,
};
use conducky_sanitize::sanitize_event_content;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::rbac::{guarded, super_admin_only, EventScope};
use crate::rest::{record_audit, MessageResponse, Pagination};
use crate::session::CurrentUser;
use crate::state::GatewayState;

/// Event with its markdown fields rendered to safe HTML.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub description_html: Option<String>,
    pub code_of_conduct_html: Option<String>,
}

impl From<Event> for EventDetail {
    fn from(event: Event) -> Self {
        Self {
            description_html: event.description.as_deref().map(sanitize_event_content),
            code_of_conduct_html: event.code_of_conduct.as_deref().map(sanitize_event_content),
            event,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub user_id: String,
    pub role_name: RoleName,
}

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new()
        .route(
            "/api/events",
            super_admin_only(get(list_events).post(create_event), state),
        )
        .route(
            "/api/events/slug/:slug",
            guarded(get(get_event), state, MEMBERS)
                .merge(guarded(patch(update_event), state, ADMINS)),
        )
        .route(
            "/api/events/slug/:slug/users",
            guarded(get(event_users), state, RESPONDERS),
        )
        .route(
            "/api/events/slug/:slug/roles",
            guarded(
                post(assign_role).delete(remove_role),
                state,
                ADMINS,
            ),
        )
        .route(
            "/api/events/slug/:slug/audit",
            guarded(get(event_audit), state, ADMINS),
        )
}

#[utoipa::path(
    post,
    path = "/api/events",
    tag = "Events",
    request_body = NewEvent,
    responses(
        (status = 201, description = "Event created", body = Event),
        (status = 400, description = "Invalid name or slug", body = ErrorResponse),
        (status = 403, description = "SuperAdmin only", body = ErrorResponse),
        (status = 409, description = "Slug already taken", body = ErrorResponse)
    )
)]
pub async fn create_event(
    State(state): State<GatewayState>,
    current: CurrentUser,
    ApiJson(payload): ApiJson<NewEvent>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    let event = state.events().create(&payload).await?;
    info!(event_id = %event.id, slug = %event.slug, user_id = %current.id(), "event created");
    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(
    get,
    path = "/api/events",
    tag = "Events",
    responses(
        (status = 200, description = "All events", body = [Event]),
        (status = 403, description = "SuperAdmin only", body = ErrorResponse)
    )
)]
pub async fn list_events(State(state): State<GatewayState>) -> ApiResult<Json<Vec<Event>>> {
    Ok(Json(state.events().list().await?))
}

#[utoipa::path(
    get,
    path = "/api/events/slug/{slug}",
    tag = "Events",
    params(("slug" = String, Path, description = "Event slug")),
    responses(
        (status = 200, description = "Event with rendered content", body = EventDetail),
        (status = 403, description = "Not a member of the event", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse)
    )
)]
pub async fn get_event(
    State(state): State<GatewayState>,
    scope: EventScope,
) -> ApiResult<Json<EventDetail>> {
    let event = state.events().get(&scope.event_id).await?;
    Ok(Json(event.into()))
}

#[utoipa::path(
    patch,
    path = "/api/events/slug/{slug}",
    tag = "Events",
    params(("slug" = String, Path, description = "Event slug")),
    request_body = EventUpdate,
    responses(
        (status = 200, description = "Updated event", body = EventDetail),
        (status = 400, description = "Nothing to update", body = ErrorResponse),
        (status = 403, description = "Event admins only", body = ErrorResponse)
    )
)]
pub async fn update_event(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    ApiJson(update): ApiJson<EventUpdate>,
) -> ApiResult<Json<EventDetail>> {
    if update.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let event = state.events().update(&scope.event_id, &update).await?;
    record_audit(
        &state,
        AuditEntry::new(
            &event.id,
            Some(current.user.id.clone()),
            "event.updated",
            "Event",
            &event.id,
        ),
    )
    .await;
    Ok(Json(event.into()))
}

#[utoipa::path(
    get,
    path = "/api/events/slug/{slug}/users",
    tag = "Events",
    params(("slug" = String, Path, description = "Event slug")),
    responses(
        (status = 200, description = "Members and their roles", body = [EventMember]),
        (status = 403, description = "Responders and admins only", body = ErrorResponse)
    )
)]
pub async fn event_users(
    State(state): State<GatewayState>,
    scope: EventScope,
) -> ApiResult<Json<Vec<EventMember>>> {
    Ok(Json(state.roles().event_members(&scope.event_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/events/slug/{slug}/roles",
    tag = "Events",
    params(("slug" = String, Path, description = "Event slug")),
    request_body = RoleAssignment,
    responses(
        (status = 201, description = "Role granted", body = MessageResponse),
        (status = 400, description = "Role cannot be assigned per event", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "User already holds the role", body = ErrorResponse)
    )
)]
pub async fn assign_role(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    ApiJson(payload): ApiJson<RoleAssignment>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    state
        .roles()
        .assign_event_role(&payload.user_id, &scope.event_id, payload.role_name)
        .await?;
    record_audit(
        &state,
        AuditEntry::new(
            &scope.event_id,
            Some(current.user.id.clone()),
            format!("role.assigned.{}", payload.role_name),
            "User",
            &payload.user_id,
        ),
    )
    .await;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!("Role {} assigned", payload.role_name))),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/events/slug/{slug}/roles",
    tag = "Events",
    params(("slug" = String, Path, description = "Event slug")),
    request_body = RoleAssignment,
    responses(
        (status = 200, description = "Role removed", body = MessageResponse),
        (status = 404, description = "User does not hold the role", body = ErrorResponse)
    )
)]
pub async fn remove_role(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    ApiJson(payload): ApiJson<RoleAssignment>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .roles()
        .remove_event_role(&payload.user_id, &scope.event_id, payload.role_name)
        .await?;
    record_audit(
        &state,
        AuditEntry::new(
            &scope.event_id,
            Some(current.user.id.clone()),
            format!("role.removed.{}", payload.role_name),
            "User",
            &payload.user_id,
        ),
    )
    .await;
    Ok(Json(MessageResponse::new(format!(
        "Role {} removed",
        payload.role_name
    ))))
}

#[utoipa::path(
    get,
    path = "/api/events/slug/{slug}/audit",
    tag = "Events",
    params(("slug" = String, Path, description = "Event slug"), Pagination),
    responses(
        (status = 200, description = "Audit trail, newest first", body = [AuditLog]),
        (status = 403, description = "Event admins only", body = ErrorResponse)
    )
)]
pub async fn event_audit(
    State(state): State<GatewayState>,
    scope: EventScope,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    let entries = state
        .audit()
        .list_for_event(&scope.event_id, page.limit(), page.offset())
        .await?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_detail_renders_markdown_fields() {
        let event = Event {
            id: "evt".into(),
            name: "RustConf".into(),
            slug: "rustconf".into(),
            description: Some("**Welcome** <script>alert(1)</script>".into()),
            code_of_conduct: None,
            contact_email: None,
            organization_id: None,
            created_at: conducky_database::now(),
            updated_at: conducky_database::now(),
        };

        let detail = EventDetail::from(event);
        let html = detail.description_html.unwrap_or_default();
        assert!(html.contains("<strong>Welcome</strong>"));
        assert!(!html.contains("<script"));
        assert!(detail.code_of_conduct_html.is_none());
    }
}
