//! Cross-cutting HTTP middleware: request logging, security headers, CORS and
//! the heuristic input scanner.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::{self, HeaderName, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Form;
use conducky_config::SecurityConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use crate::error::ApiError;

pub fn create_trace_middleware() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
}

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let start = std::time::Instant::now();
    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

pub fn create_cors_middleware(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Precomputed values for the headers added to every response.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Self {
        let csp = HeaderValue::from_str(&config.content_security_policy).unwrap_or_else(|_| {
            warn!("invalid content security policy, falling back to default-src 'self'");
            HeaderValue::from_static("default-src 'self'")
        });
        let hsts = HeaderValue::from_str(&format!(
            "max-age={}; includeSubDomains",
            config.hsts_max_age_seconds
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("max-age=31536000; includeSubDomains"));

        let headers = vec![
            (header::CONTENT_SECURITY_POLICY, csp),
            (header::STRICT_TRANSPORT_SECURITY, hsts),
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
            (
                HeaderName::from_static("permissions-policy"),
                HeaderValue::from_static("camera=(), microphone=(), geolocation=(), payment=()"),
            ),
            (
                HeaderName::from_static("cross-origin-opener-policy"),
                HeaderValue::from_static("same-origin"),
            ),
        ];
        Self { headers }
    }
}

pub async fn security_headers(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let target = response.headers_mut();
    for (name, value) in &headers.headers {
        target.insert(name.clone(), value.clone());
    }
    response
}

static XSS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)<\s*script",
        r"(?i)javascript\s*:",
        r"(?i)<[^>]*\son[a-z]+\s*=",
        r"(?i)<\s*iframe",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("xss pattern is valid"))
    .collect()
});

static SQL_INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bunion\s+(all\s+)?select\b",
        r"(?i);\s*drop\s+table\b",
        r"(?i)'\s*or\s+'?\d+'?\s*=\s*'?\d+",
        r"'\s*(--|#)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("sql pattern is valid"))
    .collect()
});

const EXEMPT_FIELDS: &[&str] = &["password", "currentPassword", "newPassword"];

pub fn is_suspicious(value: &str) -> bool {
    XSS_PATTERNS
        .iter()
        .chain(SQL_INJECTION_PATTERNS.iter())
        .any(|pattern| pattern.is_match(value))
}

fn is_exempt(field: &str) -> bool {
    EXEMPT_FIELDS.contains(&field)
}

/// Walk a JSON document; values under exempt keys are skipped.
pub fn json_is_suspicious(value: &Value) -> bool {
    match value {
        Value::String(text) => is_suspicious(text),
        Value::Array(items) => items.iter().any(json_is_suspicious),
        Value::Object(fields) => fields
            .iter()
            .any(|(key, value)| !is_exempt(key) && (is_suspicious(key) || json_is_suspicious(value))),
        _ => false,
    }
}

fn pairs_are_suspicious(pairs: &[(String, String)]) -> bool {
    pairs
        .iter()
        .any(|(key, value)| !is_exempt(key) && (is_suspicious(key) || is_suspicious(value)))
}

#[derive(Debug, Clone, Copy)]
pub struct InputScanner {
    pub enabled: bool,
    pub body_limit: usize,
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

fn rejected() -> Response {
    ApiError::bad_request("Invalid input detected").into_response()
}

/// Rejects query strings and JSON or urlencoded bodies that look like XSS or
/// SQL injection. Multipart bodies pass through unscanned.
pub async fn input_scanner(
    State(scanner): State<InputScanner>,
    request: Request,
    next: Next,
) -> Response {
    if !scanner.enabled {
        return next.run(request).await;
    }

    if let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(request.uri()) {
        if pairs_are_suspicious(&pairs) {
            warn!(path = %request.uri().path(), "suspicious query string rejected");
            return rejected();
        }
    }

    let kind = content_type(request.headers()).to_ascii_lowercase();
    let json = kind.starts_with("application/json");
    let form = kind.starts_with("application/x-www-form-urlencoded");
    if !json && !form {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, scanner.body_limit).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                .into_response()
        }
    };

    let suspicious = if json {
        serde_json::from_slice::<Value>(&bytes)
            .map(|value| json_is_suspicious(&value))
            .unwrap_or(false)
    } else {
        let form_request = Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(bytes.clone()))
            .ok();
        match form_request {
            Some(form_request) => Form::<Vec<(String, String)>>::from_request(form_request, &())
                .await
                .map(|Form(pairs)| pairs_are_suspicious(&pairs))
                .unwrap_or(false),
            None => false,
        }
    };

    if suspicious {
        warn!(path = %parts.uri.path(), "suspicious request body rejected");
        return rejected();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_script_and_injection_payloads() {
        for payload in [
            "<script>alert(1)</script>",
            "<SCRIPT src=x>",
            "click javascript:alert(1)",
            "<img src=x onerror=alert(1)>",
            "<iframe src=//evil>",
            "1 UNION SELECT password FROM users",
            "x'; DROP TABLE users",
            "' OR 1=1",
            "admin' --",
        ] {
            assert!(is_suspicious(payload), "{payload:?} should be flagged");
        }
    }

    #[test]
    fn ordinary_prose_passes() {
        for text in [
            "Someone was shouting during the keynote.",
            "Please select a union representative",
            "Drop the table by the door, or 1 = 1 might be true",
            "Use `a -- b` for ranges",
            "**bold** and _italic_",
            "onboarding = done",
        ] {
            assert!(!is_suspicious(text), "{text:?} should pass");
        }
    }

    #[test]
    fn password_fields_are_exempt() {
        let body = json!({
            "email": "a@example.com",
            "password": "<script>'; DROP TABLE x",
            "nested": { "newPassword": "' OR 1=1" }
        });
        assert!(!json_is_suspicious(&body));

        let body = json!({ "title": "ok", "tags": ["fine", "<iframe>"] });
        assert!(json_is_suspicious(&body));
    }

    #[test]
    fn security_headers_follow_config() {
        let headers = SecurityHeaders::from_config(&SecurityConfig {
            hsts_max_age_seconds: 60,
            ..SecurityConfig::default()
        });
        let hsts = headers
            .headers
            .iter()
            .find(|(name, _)| *name == header::STRICT_TRANSPORT_SECURITY)
            .map(|(_, value)| value.clone())
            .unwrap();
        assert_eq!(hsts, "max-age=60; includeSubDomains");
        assert_eq!(headers.headers.len(), 7);
    }
}
