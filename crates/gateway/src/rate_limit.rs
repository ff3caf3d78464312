//! In-memory sliding-window rate limiting.
//!
//! Each `(policy, client)` pair keeps the instants of its recent requests. A
//! request is admitted while fewer than `max_requests` fall inside the
//! trailing window.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use conducky_config::{RateLimitConfig, RateLimitRule};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ApiError;
use crate::state::GatewayState;

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPolicy {
    General,
    Auth,
    PasswordReset,
    ReportCreation,
    EvidenceUpload,
    Comment,
}

impl RateLimitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitPolicy::General => "general",
            RateLimitPolicy::Auth => "auth",
            RateLimitPolicy::PasswordReset => "password_reset",
            RateLimitPolicy::ReportCreation => "report_creation",
            RateLimitPolicy::EvidenceUpload => "evidence_upload",
            RateLimitPolicy::Comment => "comment",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RateLimitPolicy::General => "Too many requests, please try again later.",
            RateLimitPolicy::Auth => "Too many authentication attempts, please try again later.",
            RateLimitPolicy::PasswordReset => {
                "Too many password reset requests, please try again later."
            }
            RateLimitPolicy::ReportCreation => "Too many reports submitted, please try again later.",
            RateLimitPolicy::EvidenceUpload => "Too many evidence uploads, please try again later.",
            RateLimitPolicy::Comment => "Too many comments, please try again later.",
        }
    }
}

type WindowKey = (RateLimitPolicy, String);

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<WindowKey, VecDeque<Instant>>>>,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn rule(&self, policy: RateLimitPolicy) -> RateLimitRule {
        match policy {
            RateLimitPolicy::General => self.config.general,
            RateLimitPolicy::Auth => self.config.auth,
            RateLimitPolicy::PasswordReset => self.config.password_reset,
            RateLimitPolicy::ReportCreation => self.config.report_creation,
            RateLimitPolicy::EvidenceUpload => self.config.evidence_upload,
            RateLimitPolicy::Comment => self.config.comment,
        }
    }

    /// Record a request, or return how long the client must wait.
    pub async fn check(&self, policy: RateLimitPolicy, client: &str) -> Result<(), Duration> {
        self.check_at(policy, client, Instant::now()).await
    }

    pub(crate) async fn check_at(
        &self,
        policy: RateLimitPolicy,
        client: &str,
        now: Instant,
    ) -> Result<(), Duration> {
        let rule = self.rule(policy);
        let window = Duration::from_secs(rule.window_seconds);

        let mut windows = self.windows.lock().await;
        if windows.len() > PRUNE_THRESHOLD {
            let longest = self.longest_window();
            windows.retain(|_, hits| {
                hits.back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < longest)
            });
        }

        let hits = windows.entry((policy, client.to_string())).or_default();
        while hits
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= window)
        {
            hits.pop_front();
        }

        if hits.len() >= rule.max_requests as usize {
            let retry_after = hits
                .front()
                .map(|first| window.saturating_sub(now.saturating_duration_since(*first)))
                .unwrap_or(window);
            return Err(retry_after);
        }

        hits.push_back(now);
        Ok(())
    }

    fn longest_window(&self) -> Duration {
        [
            self.config.general,
            self.config.auth,
            self.config.password_reset,
            self.config.report_creation,
            self.config.evidence_upload,
            self.config.comment,
        ]
        .iter()
        .map(|rule| Duration::from_secs(rule.window_seconds))
        .max()
        .unwrap_or_default()
    }
}

/// Client identity used as the limiter key: first `X-Forwarded-For` hop,
/// then the socket address.
pub fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: RateLimiter,
    policy: RateLimitPolicy,
}

pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&guard.limiter, guard.policy, request, next).await
}

/// Applies the general policy to everything under `/api`.
pub async fn general_rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with("/api/") {
        return next.run(request).await;
    }
    enforce(&limiter, RateLimitPolicy::General, request, next).await
}

async fn enforce(
    limiter: &RateLimiter,
    policy: RateLimitPolicy,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.enabled() {
        return next.run(request).await;
    }

    let client = client_key(&request);
    match limiter.check(policy, &client).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(policy = policy.as_str(), %client, path = %request.uri().path(), "rate limit exceeded");
            too_many_requests(policy, retry_after)
        }
    }
}

fn too_many_requests(policy: RateLimitPolicy, retry_after: Duration) -> Response {
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    let mut response =
        ApiError::new(axum::http::StatusCode::TOO_MANY_REQUESTS, policy.message()).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(seconds.max(1)));
    response
}

/// Wrap a method router with a per-route policy.
pub fn throttled(
    route: MethodRouter<GatewayState>,
    state: &GatewayState,
    policy: RateLimitPolicy,
) -> MethodRouter<GatewayState> {
    route.route_layer(from_fn_with_state(
        RateLimitGuard {
            limiter: state.rate_limiter().clone(),
            policy,
        },
        rate_limit,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(max_requests: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            auth: RateLimitRule::new(max_requests, window_seconds),
            ..RateLimitConfig::default()
        })
    }

    #[tokio::test]
    async fn rejects_request_over_the_cap_and_recovers_when_window_slides() {
        let limiter = limiter(3, 60);
        let start = Instant::now();

        for offset in 0..3 {
            let at = start + Duration::from_secs(offset * 10);
            assert!(limiter.check_at(RateLimitPolicy::Auth, "10.0.0.1", at).await.is_ok());
        }

        let retry = limiter
            .check_at(RateLimitPolicy::Auth, "10.0.0.1", start + Duration::from_secs(30))
            .await
            .unwrap_err();
        assert_eq!(retry, Duration::from_secs(30));

        // The first hit falls out of the window at t=60.
        assert!(limiter
            .check_at(RateLimitPolicy::Auth, "10.0.0.1", start + Duration::from_secs(60))
            .await
            .is_ok());
        assert!(limiter
            .check_at(RateLimitPolicy::Auth, "10.0.0.1", start + Duration::from_secs(61))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn clients_and_policies_are_counted_separately() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.check_at(RateLimitPolicy::Auth, "a", now).await.is_ok());
        assert!(limiter.check_at(RateLimitPolicy::Auth, "a", now).await.is_err());
        assert!(limiter.check_at(RateLimitPolicy::Auth, "b", now).await.is_ok());
        assert!(limiter.check_at(RateLimitPolicy::Comment, "a", now).await.is_ok());
    }

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.7");

        let mut request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 4000))));
        assert_eq!(client_key(&request), "192.168.1.5");
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let response = too_many_requests(RateLimitPolicy::Auth, Duration::from_millis(1500));
        assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }
}
