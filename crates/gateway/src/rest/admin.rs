use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use conducky_database::UserWithRoles;

use crate::error::{ApiResult, ErrorResponse};
use crate::rbac::super_admin_only;
use crate::state::GatewayState;

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new().route("/api/admin/users", super_admin_only(get(list_users), state))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "Admin",
    responses(
        (status = 200, description = "Every user with their global roles", body = [UserWithRoles]),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "SuperAdmin only", body = ErrorResponse)
    )
)]
pub async fn list_users(State(state): State<GatewayState>) -> ApiResult<Json<Vec<UserWithRoles>>> {
    Ok(Json(state.users().list_with_global_roles().await?))
}
