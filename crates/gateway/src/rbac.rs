//! Role-based access control.
//!
//! `require_role` admits a request when the caller holds one of the allowed
//! roles for the event the request targets. The event is resolved from, in
//! order: the `eventId` query parameter, the `eventId` field of a JSON body,
//! the `eventId` route parameter, the event of the `reportId` route
//! parameter, and the event behind the `slug` route parameter.
//!
//! A global SuperAdmin is admitted without an event role only when
//! `SuperAdmin` is itself one of the allowed roles.

use std::collections::HashMap;

use axum::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use conducky_database::{DatabaseError, RoleName, User};
use thiserror::Error;
use tracing::{error, warn};

use crate::error::{ApiError, ApiResult};
use crate::session::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("Event context is required for this role check")]
    MissingEventContext,
    #[error("Forbidden: insufficient role")]
    InsufficientRole,
    #[error("Failed to check user roles")]
    RoleCheck(#[source] DatabaseError),
}

impl From<RbacError> for ApiError {
    fn from(error: RbacError) -> Self {
        match &error {
            RbacError::Unauthenticated => ApiError::not_authenticated(),
            RbacError::MissingEventContext => ApiError::bad_request(error.to_string()),
            RbacError::InsufficientRole => ApiError::forbidden(error.to_string()),
            RbacError::RoleCheck(source) => {
                error!(error = %source, "role lookup failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
                    .with_details(source.to_string())
            }
        }
    }
}

/// Places a request may name its event.
#[derive(Debug, Clone, Default)]
pub struct EventHints {
    pub query_event_id: Option<String>,
    pub body_event_id: Option<String>,
    pub route_event_id: Option<String>,
    pub report_id: Option<String>,
    pub slug: Option<String>,
}

/// The event a guarded request was authorized against.
#[derive(Debug, Clone)]
pub struct EventScope {
    pub event_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for EventScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<EventScope>()
            .cloned()
            .ok_or_else(|| ApiError::not_found("Event not found"))
    }
}

pub async fn resolve_event(
    state: &GatewayState,
    hints: &EventHints,
) -> Result<Option<String>, DatabaseError> {
    let direct = [
        &hints.query_event_id,
        &hints.body_event_id,
        &hints.route_event_id,
    ]
    .into_iter()
    .flatten()
    .find(|id| !id.is_empty());
    if let Some(event_id) = direct {
        return Ok(Some(event_id.clone()));
    }

    if let Some(report_id) = &hints.report_id {
        if let Some(event_id) = state.reports().event_id_for(report_id).await? {
            return Ok(Some(event_id));
        }
    }

    if let Some(slug) = &hints.slug {
        return state.events().id_for_slug(slug).await;
    }

    Ok(None)
}

/// Decide whether `user` may proceed. On success returns the resolved event,
/// which is always present unless a SuperAdmin was admitted without one.
pub async fn authorize(
    state: &GatewayState,
    user: Option<&User>,
    allowed: &[RoleName],
    hints: &EventHints,
) -> Result<Option<String>, RbacError> {
    let user = user.ok_or(RbacError::Unauthenticated)?;
    let roles = state.roles();

    if allowed.contains(&RoleName::SuperAdmin)
        && roles
            .is_super_admin(&user.id)
            .await
            .map_err(RbacError::RoleCheck)?
    {
        return resolve_event(state, hints)
            .await
            .map_err(RbacError::RoleCheck);
    }

    if allowed.iter().all(|role| *role == RoleName::SuperAdmin) {
        return Err(RbacError::InsufficientRole);
    }

    let event_id = resolve_event(state, hints)
        .await
        .map_err(RbacError::RoleCheck)?
        .ok_or(RbacError::MissingEventContext)?;

    if roles
        .has_any_event_role(&user.id, &event_id, allowed)
        .await
        .map_err(RbacError::RoleCheck)?
    {
        Ok(Some(event_id))
    } else {
        Err(RbacError::InsufficientRole)
    }
}

#[derive(Clone)]
pub struct RoleGuard {
    state: GatewayState,
    allowed: &'static [RoleName],
}

pub async fn require_role(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let Some(current) = parts.extensions.get::<CurrentUser>().cloned() else {
        return ApiError::from(RbacError::Unauthenticated).into_response();
    };

    let query_event_id = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(mut query)| query.remove("eventId"));

    let (body, body_event_id) = if is_json(&parts.headers) {
        let limit = guard.state.settings().uploads.json_max_bytes;
        let bytes = match to_bytes(body, limit).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                    .into_response()
            }
        };
        let event_id = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|value| value.get("eventId")?.as_str().map(str::to_string));
        (Body::from(bytes), event_id)
    } else {
        (body, None)
    };

    let mut params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();

    let hints = EventHints {
        query_event_id,
        body_event_id,
        route_event_id: params.remove("eventId"),
        report_id: params.remove("reportId"),
        slug: params.remove("slug"),
    };

    match authorize(&guard.state, Some(&current.user), guard.allowed, &hints).await {
        Ok(event_id) => {
            if let Some(event_id) = event_id {
                parts.extensions.insert(EventScope { event_id });
            }
            next.run(Request::from_parts(parts, body)).await
        }
        Err(error) => {
            if matches!(error, RbacError::InsufficientRole) {
                warn!(user_id = %current.user.id, path = %parts.uri.path(), "role check denied");
            }
            ApiError::from(error).into_response()
        }
    }
}

/// Pure global SuperAdmin check; never needs an event.
pub async fn require_super_admin(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(current) = request.extensions().get::<CurrentUser>() else {
        return ApiError::from(RbacError::Unauthenticated).into_response();
    };

    match state.roles().is_super_admin(current.id()).await {
        Ok(true) => next.run(request).await,
        Ok(false) => ApiError::from(RbacError::InsufficientRole).into_response(),
        Err(source) => ApiError::from(RbacError::RoleCheck(source)).into_response(),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

pub fn guarded(
    route: MethodRouter<GatewayState>,
    state: &GatewayState,
    allowed: &'static [RoleName],
) -> MethodRouter<GatewayState> {
    route.route_layer(from_fn_with_state(
        RoleGuard {
            state: state.clone(),
            allowed,
        },
        require_role,
    ))
}

pub fn super_admin_only(
    route: MethodRouter<GatewayState>,
    state: &GatewayState,
) -> MethodRouter<GatewayState> {
    route.route_layer(from_fn_with_state(state.clone(), require_super_admin))
}

/// The caller's standing within one event, for checks finer than a guard.
#[derive(Debug, Clone, Default)]
pub struct EventAccess {
    pub super_admin: bool,
    pub roles: Vec<RoleName>,
}

impl EventAccess {
    pub fn is_responder(&self) -> bool {
        self.super_admin || self.roles.iter().any(RoleName::is_responder)
    }

    pub fn is_admin(&self) -> bool {
        self.super_admin || self.roles.contains(&RoleName::Admin)
    }
}

pub async fn event_access(
    state: &GatewayState,
    user_id: &str,
    event_id: &str,
) -> ApiResult<EventAccess> {
    let roles = state.roles();
    let super_admin = roles
        .is_super_admin(user_id)
        .await
        .map_err(RbacError::RoleCheck)?;
    let event_roles = roles
        .event_roles(user_id, event_id)
        .await
        .map_err(RbacError::RoleCheck)?;
    Ok(EventAccess {
        super_admin,
        roles: event_roles,
    })
}
