//! Error type returned by every handler and middleware.

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conducky_auth::AuthError;
use conducky_database::DatabaseError;
use conducky_email::EmailError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use tracing::{error, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Log `source` and hide it behind a generic message.
    pub fn internal(source: impl Display) -> Self {
        error!(error = %source, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            .with_details(source.to_string())
    }

    pub fn not_authenticated() -> Self {
        Self::unauthorized("Not authenticated")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

/// `Json` whose rejections answer with the usual error body: 400 for
/// malformed or incomplete payloads, 413 when the body is over the limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, "Invalid request body").with_details(rejection.body_text())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound(_) => Self::not_found(error.to_string()),
            DatabaseError::Conflict(message) => Self::conflict(message),
            DatabaseError::Validation(message) => Self::bad_request(message),
            DatabaseError::InvalidTransition { .. } | DatabaseError::MissingRequiredFields => {
                Self::bad_request(error.to_string())
            }
            DatabaseError::Sqlx(source) => Self::internal(source),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::UserExists => Self::conflict("User already exists"),
            AuthError::InvalidCredentials => Self::unauthorized("Invalid email or password"),
            AuthError::InvalidEmail | AuthError::WeakPassword(_) => {
                Self::bad_request(error.to_string())
            }
            AuthError::InvalidResetToken => Self::bad_request("Invalid or expired reset token"),
            AuthError::SessionNotFound | AuthError::SessionExpired | AuthError::InvalidSession => {
                Self::not_authenticated()
            }
            AuthError::UserNotFound => Self::not_found("User not found"),
            AuthError::ProviderDisabled(_) => Self::unavailable(error.to_string()),
            AuthError::OAuth(source) => {
                warn!(error = %source, "oauth exchange failed");
                Self::new(StatusCode::BAD_GATEWAY, "OAuth provider error")
                    .with_details(source.to_string())
            }
            AuthError::Database(source) => Self::internal(source),
            AuthError::PasswordHash(source) => Self::internal(source),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(error: EmailError) -> Self {
        Self::internal(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conducky_database::ReportState;

    #[test]
    fn database_errors_map_to_statuses() {
        let cases = [
            (DatabaseError::NotFound("Report"), StatusCode::NOT_FOUND),
            (DatabaseError::Conflict("taken".into()), StatusCode::CONFLICT),
            (DatabaseError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (DatabaseError::MissingRequiredFields, StatusCode::BAD_REQUEST),
            (
                DatabaseError::InvalidTransition {
                    from: ReportState::Closed,
                    to: ReportState::Submitted,
                },
                StatusCode::BAD_REQUEST,
            ),
            (DatabaseError::Sqlx(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn internal_errors_carry_details() {
        let error = ApiError::internal("disk on fire");
        assert_eq!(error.message, "Internal server error");
        assert_eq!(error.details.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn duplicate_users_are_conflicts() {
        assert_eq!(ApiError::from(AuthError::UserExists).status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status,
            StatusCode::UNAUTHORIZED
        );
    }
}
