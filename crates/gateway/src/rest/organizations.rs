//! Organizations group events and carry their own membership roles.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use conducky_database::{
    NewOrganization, OrgRole, Organization, OrganizationDetail, OrganizationMember,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::rbac::{super_admin_only, RbacError};
use crate::rest::MessageResponse;
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: String,
    pub role: OrgRole,
}

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new()
        .route(
            "/api/organizations",
            super_admin_only(get(list_organizations).post(create_organization), state),
        )
        .route("/api/organizations/slug/:slug", get(get_organization))
        .route("/api/organizations/slug/:slug/members", post(add_member))
        .route(
            "/api/organizations/slug/:slug/members/:user_id",
            delete(remove_member),
        )
}

async fn load(state: &GatewayState, slug: &str) -> ApiResult<Organization> {
    state
        .organizations()
        .find_by_slug(slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))
}

/// SuperAdmins pass; everyone else needs a membership, and `org_admin`
/// when `require_admin` is set.
async fn ensure_org_role(
    state: &GatewayState,
    current: &CurrentUser,
    organization: &Organization,
    require_admin: bool,
) -> ApiResult<()> {
    if state
        .roles()
        .is_super_admin(current.id())
        .await
        .map_err(RbacError::RoleCheck)?
    {
        return Ok(());
    }

    let role = state
        .organizations()
        .membership_role(&organization.id, current.id())
        .await?;
    match role {
        Some(OrgRole::OrgAdmin) => Ok(()),
        Some(OrgRole::OrgViewer) if !require_admin => Ok(()),
        _ => Err(RbacError::InsufficientRole.into()),
    }
}

#[utoipa::path(
    post,
    path = "/api/organizations",
    tag = "Organizations",
    request_body = NewOrganization,
    responses(
        (status = 201, description = "Organization created; creator is org_admin", body = Organization),
        (status = 400, description = "Invalid name or slug", body = ErrorResponse),
        (status = 403, description = "SuperAdmin only", body = ErrorResponse),
        (status = 409, description = "Slug already taken", body = ErrorResponse)
    )
)]
pub async fn create_organization(
    State(state): State<GatewayState>,
    current: CurrentUser,
    ApiJson(payload): ApiJson<NewOrganization>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    let organization = state
        .organizations()
        .create(current.id(), &payload)
        .await?;
    info!(organization_id = %organization.id, slug = %organization.slug, "organization created");
    Ok((StatusCode::CREATED, Json(organization)))
}

#[utoipa::path(
    get,
    path = "/api/organizations",
    tag = "Organizations",
    responses(
        (status = 200, description = "All organizations", body = [Organization]),
        (status = 403, description = "SuperAdmin only", body = ErrorResponse)
    )
)]
pub async fn list_organizations(
    State(state): State<GatewayState>,
) -> ApiResult<Json<Vec<Organization>>> {
    Ok(Json(state.organizations().list().await?))
}

#[utoipa::path(
    get,
    path = "/api/organizations/slug/{slug}",
    tag = "Organizations",
    params(("slug" = String, Path, description = "Organization slug")),
    responses(
        (status = 200, description = "Organization with members and events", body = OrganizationDetail),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    )
)]
pub async fn get_organization(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<OrganizationDetail>> {
    let organization = load(&state, &slug).await?;
    ensure_org_role(&state, &current, &organization, false).await?;
    Ok(Json(state.organizations().detail(organization).await?))
}

#[utoipa::path(
    post,
    path = "/api/organizations/slug/{slug}/members",
    tag = "Organizations",
    params(("slug" = String, Path, description = "Organization slug")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = OrganizationMember),
        (status = 403, description = "org_admin or SuperAdmin only", body = ErrorResponse),
        (status = 404, description = "Organization or user not found", body = ErrorResponse),
        (status = 409, description = "Already a member", body = ErrorResponse)
    )
)]
pub async fn add_member(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(slug): Path<String>,
    ApiJson(payload): ApiJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<OrganizationMember>)> {
    let organization = load(&state, &slug).await?;
    ensure_org_role(&state, &current, &organization, true).await?;
    let member = state
        .organizations()
        .add_member(&organization.id, &payload.user_id, payload.role)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    delete,
    path = "/api/organizations/slug/{slug}/members/{user_id}",
    tag = "Organizations",
    params(
        ("slug" = String, Path, description = "Organization slug"),
        ("user_id" = String, Path, description = "Member user id")
    ),
    responses(
        (status = 200, description = "Member removed", body = MessageResponse),
        (status = 403, description = "org_admin or SuperAdmin only", body = ErrorResponse),
        (status = 404, description = "Membership not found", body = ErrorResponse)
    )
)]
pub async fn remove_member(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path((slug, user_id)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let organization = load(&state, &slug).await?;
    ensure_org_role(&state, &current, &organization, true).await?;
    state
        .organizations()
        .remove_member(&organization.id, &user_id)
        .await?;
    Ok(Json(MessageResponse::new("Member removed")))
}
