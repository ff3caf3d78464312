//! REST API endpoints for the gateway

pub mod admin;
pub mod auth;
pub mod comments;
pub mod events;
pub mod evidence;
pub mod health;
pub mod invites;
pub mod notifications;
pub mod organizations;
pub mod reports;
pub mod users;

use axum::Router;
use conducky_database::{AuditEntry, NewNotification};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::state::GatewayState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Create all REST API routes
pub fn create_rest_routes(state: &GatewayState) -> Router<GatewayState> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes(state))
        .merge(users::routes())
        .merge(events::routes(state))
        .merge(invites::routes(state))
        .merge(reports::routes(state))
        .merge(evidence::routes(state))
        .merge(comments::routes(state))
        .merge(notifications::routes())
        .merge(organizations::routes(state))
        .merge(admin::routes(state))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Best-effort fan-out; a failed insert never fails the request.
pub(crate) async fn notify(state: &GatewayState, notifications: Vec<NewNotification>) {
    if notifications.is_empty() {
        return;
    }
    if let Err(error) = state.notifications().create_many(&notifications).await {
        warn!(%error, count = notifications.len(), "failed to store notifications");
    }
}

/// Audit failures are logged, never surfaced to the caller.
pub(crate) async fn record_audit(state: &GatewayState, entry: AuditEntry) {
    let action = entry.action.clone().unwrap_or_default();
    if let Err(error) = state.audit().record(entry).await {
        warn!(%error, %action, "failed to write audit entry");
    }
}

#[cfg(test)]
mod tests {
    use super::Pagination;

    #[test]
    fn pagination_is_clamped() {
        let page = Pagination {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(page.limit(), 100);
        assert_eq!(page.offset(), 0);
        assert_eq!(Pagination::default().limit(), 20);
    }
}
