//! Local and social authentication endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use conducky_auth::SocialProvider;
use conducky_database::{RoleName, User};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::rate_limit::{throttled, RateLimitPolicy};
use crate::rest::MessageResponse;
use crate::session::{removal_cookie, session_cookie, CurrentUser};
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: User,
    pub roles: Vec<RoleName>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResetTokenQuery {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetTokenStatus {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OAuthLoginQuery {
    pub redirect_uri: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthLoginResponse {
    pub authorize_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OAuthCallbackRequest {
    pub code: String,
    pub state: String,
    pub redirect_uri: String,
}

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new()
        .route("/register", throttled(post(register), state, RateLimitPolicy::Auth))
        .route("/login", throttled(post(login), state, RateLimitPolicy::Auth))
        .route("/logout", post(logout))
        .route("/session", get(session))
        .route(
            "/auth/forgot-password",
            throttled(post(forgot_password), state, RateLimitPolicy::PasswordReset),
        )
        .route("/auth/validate-reset-token", get(validate_reset_token))
        .route(
            "/auth/reset-password",
            throttled(post(reset_password), state, RateLimitPolicy::PasswordReset),
        )
        .route("/auth/:provider/login", get(oauth_login))
        .route(
            "/auth/:provider/callback",
            throttled(post(oauth_callback), state, RateLimitPolicy::Auth),
        )
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = RegisteredUser),
        (status = 400, description = "Invalid email or weak password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<GatewayState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<RegisteredUser>)> {
    let registration = state
        .authenticator()
        .register(&payload.email, &payload.password, payload.name.as_deref())
        .await?;

    let user = registration.user;
    let email = state.email().clone();
    let (to, name) = (user.email.clone(), display_name(&user));
    tokio::spawn(async move {
        if let Err(error) = email.send_welcome(&to, &name).await {
            warn!(%error, "failed to send welcome email");
        }
    });

    let jar = jar.add(session_cookie(
        &state.settings().auth,
        registration.session.token,
    ));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(RegisteredUser {
            id: user.id,
            email: user.email,
            name: user.name,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<GatewayState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let (user, session) = state
        .authenticator()
        .login(&payload.email, &payload.password)
        .await?;

    let jar = jar.add(session_cookie(&state.settings().auth, session.token));
    Ok((jar, Json(LoginResponse { user })))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Session ended", body = MessageResponse)
    )
)]
pub async fn logout(
    State(state): State<GatewayState>,
    jar: CookieJar,
    current: Option<CurrentUser>,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    if let Some(current) = current {
        state.authenticator().logout(&current.token).await?;
        info!(user_id = %current.user.id, "user logged out");
    }
    let jar = jar.remove(removal_cookie(&state.settings().auth));
    Ok((jar, Json(MessageResponse::new("Logged out"))))
}

#[utoipa::path(
    get,
    path = "/session",
    tag = "Auth",
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn session(
    State(state): State<GatewayState>,
    current: CurrentUser,
) -> ApiResult<Json<SessionResponse>> {
    let roles = state.roles().global_roles(current.id()).await?;
    Ok(Json(SessionResponse {
        user: current.user,
        roles,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent when the account exists", body = MessageResponse),
        (status = 429, description = "Too many reset requests", body = ErrorResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<GatewayState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let reset = state
        .authenticator()
        .create_password_reset(&payload.email)
        .await?;

    if let Some(reset) = reset {
        let reset_url = format!(
            "{}/reset-password?token={}",
            state.settings().auth.frontend_base_url.trim_end_matches('/'),
            reset.token
        );
        let name = display_name(&reset.user);
        if let Err(error) = state
            .email()
            .send_password_reset(&reset.user.email, &name, &reset_url)
            .await
        {
            warn!(%error, user_id = %reset.user.id, "failed to send password reset email");
        }
    }

    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

#[utoipa::path(
    get,
    path = "/auth/validate-reset-token",
    tag = "Auth",
    params(ResetTokenQuery),
    responses(
        (status = 200, description = "Token validity", body = ResetTokenStatus)
    )
)]
pub async fn validate_reset_token(
    State(state): State<GatewayState>,
    Query(query): Query<ResetTokenQuery>,
) -> ApiResult<Json<ResetTokenStatus>> {
    let expires_at = state
        .authenticator()
        .validate_reset_token(&query.token)
        .await?;
    Ok(Json(ResetTokenStatus {
        valid: expires_at.is_some(),
        expires_at: expires_at.map(conducky_database::timestamp),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid token or weak password", body = ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<GatewayState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .authenticator()
        .reset_password(&payload.token, &payload.password)
        .await?;
    Ok(Json(MessageResponse::new(
        "Password has been reset. You can now log in with your new password.",
    )))
}

fn parse_provider(raw: &str) -> ApiResult<SocialProvider> {
    raw.parse::<SocialProvider>()
        .map_err(|_| ApiError::not_found("Unknown authentication provider"))
}

#[utoipa::path(
    get,
    path = "/auth/{provider}/login",
    tag = "Auth",
    params(
        ("provider" = String, Path, description = "`github` or `google`"),
        OAuthLoginQuery
    ),
    responses(
        (status = 200, description = "Provider authorization URL", body = OAuthLoginResponse),
        (status = 503, description = "Provider not configured", body = ErrorResponse)
    )
)]
pub async fn oauth_login(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthLoginQuery>,
) -> ApiResult<Json<OAuthLoginResponse>> {
    let provider = parse_provider(&provider)?;
    if !state.authenticator().provider_enabled(provider) {
        return Err(ApiError::unavailable(format!("{provider} login is not configured")));
    }

    let csrf_state = state.oauth_state().issue().await;
    let authorize_url =
        state
            .authenticator()
            .authorization_url(provider, &csrf_state, &query.redirect_uri)?;
    Ok(Json(OAuthLoginResponse { authorize_url }))
}

#[utoipa::path(
    post,
    path = "/auth/{provider}/callback",
    tag = "Auth",
    params(("provider" = String, Path, description = "`github` or `google`")),
    request_body = OAuthCallbackRequest,
    responses(
        (status = 200, description = "Logged in through the provider", body = LoginResponse),
        (status = 400, description = "Unknown or expired OAuth state", body = ErrorResponse),
        (status = 502, description = "Provider exchange failed", body = ErrorResponse),
        (status = 503, description = "Provider not configured", body = ErrorResponse)
    )
)]
pub async fn oauth_callback(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<OAuthCallbackRequest>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let provider = parse_provider(&provider)?;
    if !state.authenticator().provider_enabled(provider) {
        return Err(ApiError::unavailable(format!("{provider} login is not configured")));
    }
    if !state.oauth_state().consume(&payload.state).await {
        return Err(ApiError::bad_request("Invalid or expired OAuth state"));
    }

    let (user, session) = state
        .authenticator()
        .login_with_oauth_code(provider, &payload.code, &payload.redirect_uri)
        .await?;

    let jar = jar.add(session_cookie(&state.settings().auth, session.token));
    Ok((jar, Json(LoginResponse { user })))
}

fn display_name(user: &User) -> String {
    user.name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| user.email.clone())
}
