//! # Conducky Gateway Crate
//!
//! HTTP surface of the Conducky backend: REST routes, session resolution,
//! role checks and the security middleware in front of them.
//!
//! ## Architecture
//!
//! - **REST**: endpoints grouped by resource, documented with OpenAPI
//! - **Session / RBAC**: cookie or bearer sessions and per-event role guards
//! - **Rate limiting**: sliding windows per client and policy
//! - **Middleware**: logging, CORS, security headers and input scanning
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conducky_gateway::{create_router, GatewayState};
//!
//! # async fn run(pool: sqlx::SqlitePool, config: conducky_config::AppConfig) -> anyhow::Result<()> {
//! let state = GatewayState::new(pool, &config);
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod docs;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod rbac;
pub mod rest;
pub mod session;
pub mod state;

pub use error::{ApiError, ApiJson, ApiResult, ErrorResponse};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use rbac::{EventScope, RbacError};
pub use session::CurrentUser;
pub use state::{GatewaySettings, GatewayState, OAuthStateStore};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::middleware::{InputScanner, SecurityHeaders};

/// Build the application router with every route and middleware attached.
pub fn create_router(state: GatewayState) -> Router {
    let settings = state.settings().clone();
    let scanner = InputScanner {
        enabled: settings.security.input_scanner,
        body_limit: settings.uploads.json_max_bytes,
    };
    let headers = Arc::new(SecurityHeaders::from_config(&settings.security));

    let api = rest::create_rest_routes(&state)
        .layer(DefaultBodyLimit::max(settings.uploads.json_max_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(scanner, middleware::input_scanner))
                .layer(from_fn_with_state(state.clone(), session::resolve_session))
                .layer(from_fn_with_state(
                    state.rate_limiter().clone(),
                    rate_limit::general_rate_limit,
                )),
        )
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(SwaggerUi::new("/api-docs/ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api-docs", get(|| async { Redirect::permanent("/api-docs/ui/") }))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::create_trace_middleware())
                .layer(from_fn(middleware::logging_middleware))
                .layer(from_fn_with_state(headers, middleware::security_headers))
                .layer(middleware::create_cors_middleware(&settings.security)),
        )
}
