//! Invite links: event admins mint them, anyone can preview, signed-in users redeem.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use conducky_database::{AuditEntry, EventInvite, InvitePreview, NewInvite, ADMINS};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ApiJson, ApiResult, ErrorResponse};
use crate::rbac::{guarded, EventScope};
use crate::rest::record_audit;
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteStatusUpdate {
    pub disabled: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub message: String,
    pub event_slug: String,
    pub invite: EventInvite,
}

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new()
        .route(
            "/api/events/slug/:slug/invites",
            guarded(get(list_invites).post(create_invite), state, ADMINS),
        )
        .route(
            "/api/events/slug/:slug/invites/:invite_id",
            guarded(patch(update_invite), state, ADMINS),
        )
        .route("/invites/:code", get(preview_invite))
        .route("/invites/:code/redeem", post(redeem_invite))
}

#[utoipa::path(
    post,
    path = "/api/events/slug/{slug}/invites",
    tag = "Invites",
    params(("slug" = String, Path, description = "Event slug")),
    request_body = NewInvite,
    responses(
        (status = 201, description = "Invite created", body = EventInvite),
        (status = 400, description = "Invalid role, use cap or expiry", body = ErrorResponse),
        (status = 403, description = "Event admins only", body = ErrorResponse)
    )
)]
pub async fn create_invite(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    ApiJson(payload): ApiJson<NewInvite>,
) -> ApiResult<(StatusCode, Json<EventInvite>)> {
    let invite = state
        .invites()
        .create(&scope.event_id, current.id(), &payload)
        .await?;
    record_audit(
        &state,
        AuditEntry::new(
            &scope.event_id,
            Some(current.user.id.clone()),
            "invite.created",
            "EventInviteLink",
            &invite.id,
        ),
    )
    .await;
    Ok((StatusCode::CREATED, Json(invite)))
}

#[utoipa::path(
    get,
    path = "/api/events/slug/{slug}/invites",
    tag = "Invites",
    params(("slug" = String, Path, description = "Event slug")),
    responses(
        (status = 200, description = "Invites for the event", body = [EventInvite]),
        (status = 403, description = "Event admins only", body = ErrorResponse)
    )
)]
pub async fn list_invites(
    State(state): State<GatewayState>,
    scope: EventScope,
) -> ApiResult<Json<Vec<EventInvite>>> {
    Ok(Json(state.invites().list_for_event(&scope.event_id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/events/slug/{slug}/invites/{invite_id}",
    tag = "Invites",
    params(
        ("slug" = String, Path, description = "Event slug"),
        ("invite_id" = String, Path, description = "Invite id")
    ),
    request_body = InviteStatusUpdate,
    responses(
        (status = 200, description = "Invite updated", body = EventInvite),
        (status = 404, description = "Invite not found in this event", body = ErrorResponse)
    )
)]
pub async fn update_invite(
    State(state): State<GatewayState>,
    current: CurrentUser,
    scope: EventScope,
    Path((_slug, invite_id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<InviteStatusUpdate>,
) -> ApiResult<Json<EventInvite>> {
    let invite = state
        .invites()
        .set_disabled(&scope.event_id, &invite_id, payload.disabled)
        .await?;
    let action = if payload.disabled {
        "invite.disabled"
    } else {
        "invite.enabled"
    };
    record_audit(
        &state,
        AuditEntry::new(
            &scope.event_id,
            Some(current.user.id.clone()),
            action,
            "EventInviteLink",
            &invite.id,
        ),
    )
    .await;
    Ok(Json(invite))
}

#[utoipa::path(
    get,
    path = "/invites/{code}",
    tag = "Invites",
    params(("code" = String, Path, description = "Invite code")),
    responses(
        (status = 200, description = "Invite preview", body = InvitePreview),
        (status = 404, description = "Unknown invite code", body = ErrorResponse)
    )
)]
pub async fn preview_invite(
    State(state): State<GatewayState>,
    Path(code): Path<String>,
) -> ApiResult<Json<InvitePreview>> {
    Ok(Json(state.invites().preview(&code).await?))
}

#[utoipa::path(
    post,
    path = "/invites/{code}/redeem",
    tag = "Invites",
    params(("code" = String, Path, description = "Invite code")),
    responses(
        (status = 200, description = "Role granted", body = RedeemResponse),
        (status = 400, description = "Invite disabled, expired or exhausted", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Unknown invite code", body = ErrorResponse),
        (status = 409, description = "Role already held", body = ErrorResponse)
    )
)]
pub async fn redeem_invite(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(code): Path<String>,
) -> ApiResult<Json<RedeemResponse>> {
    let invite = state.invites().redeem(&code, current.id()).await?;
    let event = state.events().get(&invite.event_id).await?;
    info!(user_id = %current.id(), event_id = %event.id, "joined event through invite");
    Ok(Json(RedeemResponse {
        message: format!("Joined {} as {}", event.name, invite.role_name),
        event_slug: event.slug,
        invite,
    }))
}
