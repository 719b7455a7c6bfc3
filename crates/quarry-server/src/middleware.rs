//! Quarry Middleware
//!
//! HTTP middleware for request ID generation, session authentication and
//! login rate limiting.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::session::CurrentSession;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

// =============================================================================
// Rate Limiter
// =============================================================================

/// Token bucket rate limiter entry for a single client.
#[derive(Debug, Clone)]
struct RateLimitEntry {
    tokens: f64,
    last_update: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    entries: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
    max_requests: u32,
    window_secs: u64,
}

impl RateLimiter {
    /// Create a new rate limiter with the specified requests per minute.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_requests: requests_per_minute,
            window_secs: 60,
        }
    }

    /// Requests per window; 0 means unlimited.
    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Check if a request from the given key should be allowed.
    /// Returns true if allowed, false if rate limited.
    pub fn check(&self, key: &str) -> bool {
        let mut entries = self.entries.write();
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert_with(|| RateLimitEntry {
            tokens: self.max_requests as f64,
            last_update: now,
        });

        // Token bucket refill
        let elapsed = now.duration_since(entry.last_update);
        let refill_rate = self.max_requests as f64 / self.window_secs as f64;
        let refill = elapsed.as_secs_f64() * refill_rate;
        entry.tokens = (entry.tokens + refill).min(self.max_requests as f64);
        entry.last_update = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop entries idle for two windows.
    pub fn cleanup(&self) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        let max_age = Duration::from_secs(self.window_secs * 2);

        entries.retain(|_, entry| now.duration_since(entry.last_update) < max_age);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}

// =============================================================================
// Request ID Middleware
// =============================================================================

/// Add a unique request ID to each request.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    let mut response = next.run(request).await;

    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    response
}

// =============================================================================
// Authentication Middleware
// =============================================================================

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn unauthorized(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": "UNAUTHORIZED"
        })),
    )
}

/// Require a live session for protected routes. The resolved session is
/// attached to the request as a [`CurrentSession`] extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response<Body>, impl IntoResponse> {
    let token = match bearer_token(&request) {
        Some(token) => token.to_string(),
        None => return Err(unauthorized("Missing or invalid Authorization header")),
    };

    match state.sessions.get(&token) {
        Some(context) => {
            request
                .extensions_mut()
                .insert(CurrentSession { token, context });
            Ok(next.run(request).await)
        }
        None => Err(unauthorized("Invalid or expired session token")),
    }
}

// =============================================================================
// Rate Limiting Middleware
// =============================================================================

/// Client address of a request: the connection's peer address, or the
/// first hop of `X-Forwarded-For` / `X-Real-IP` when proxy headers are trusted.
fn get_client_ip(request: &Request<Body>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let headers = request.headers();
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded.or(real_ip) {
            return ip.to_string();
        }
    }

    if let Some(connect_info) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Rate limit login attempts per client IP.
/// Returns 429 Too Many Requests once the client exceeds the limit.
pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response<Body>, impl IntoResponse> {
    let rate_limit = state.login_rate_limiter.limit();

    // 0 disables the limit
    if rate_limit == 0 {
        return Ok(next.run(request).await);
    }

    let client_ip = get_client_ip(&request, state.config.trust_proxy_headers);
    if state.login_rate_limiter.check(&format!("login:{}", client_ip)) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Login rate limit exceeded for {}", client_ip);
        Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": format!("Too many login attempts. Limit: {} attempts per minute.", rate_limit),
                "code": "RATE_LIMITED",
                "retry_after_seconds": 60
            })),
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::testing;
    use axum::{routing::get, Extension, Router};
    use tower::util::ServiceExt;

    async fn handler() -> &'static str {
        "ok"
    }

    async fn whoami(Extension(session): Extension<CurrentSession>) -> String {
        session.context.lock().username.clone()
    }

    #[tokio::test]
    async fn test_request_id_middleware() {
        let app = Router::new()
            .route("/", get(handler))
            .layer(axum::middleware::from_fn(request_id));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_auth_middleware_no_token() {
        let state = testing::state();

        let app = Router::new()
            .route("/", get(handler))
            .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_middleware_invalid_token() {
        let state = testing::state();

        let app = Router::new()
            .route("/", get(handler))
            .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Authorization", "Bearer invalid_token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_middleware_attaches_session() {
        let state = testing::state();
        let token = state.sessions.create("analyst");

        let app = Router::new()
            .route("/", get(whoami))
            .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"analyst");
    }

    fn rate_limited_app(state: AppState) -> Router {
        Router::new()
            .route("/", get(handler))
            .layer(axum::middleware::from_fn_with_state(state.clone(), login_rate_limit))
            .with_state(state)
    }

    fn from_peer(peer: [u8; 4], forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", format!("{ip}, 10.0.0.1"));
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        request
    }

    #[tokio::test]
    async fn test_login_rate_limit_per_peer() {
        let app = rate_limited_app(testing::state());

        for _ in 0..10 {
            let response = app.clone().oneshot(from_peer([203, 0, 113, 7], None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let limited = app.clone().oneshot(from_peer([203, 0, 113, 7], None)).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = app.oneshot(from_peer([198, 51, 100, 2], None)).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_rate_limit_ignores_forwarded_for_by_default() {
        let app = rate_limited_app(testing::state());

        for i in 0..10u8 {
            let spoofed = format!("192.0.2.{i}");
            let response = app
                .clone()
                .oneshot(from_peer([203, 0, 113, 7], Some(&spoofed)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let limited = app
            .oneshot(from_peer([203, 0, 113, 7], Some("192.0.2.99")))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_login_rate_limit_trusts_proxy_headers_when_enabled() {
        let mut state = testing::state();
        state.config = Arc::new(ServerConfig::default().with_trust_proxy_headers(true));
        let app = rate_limited_app(state);

        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(from_peer([10, 0, 0, 1], Some("203.0.113.7")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let limited = app
            .clone()
            .oneshot(from_peer([10, 0, 0, 1], Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = app
            .oneshot(from_peer([10, 0, 0, 1], Some("198.51.100.2")))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[test]
    fn test_rate_limiter_allows_requests() {
        let limiter = RateLimiter::new(10);

        for _ in 0..10 {
            assert!(limiter.check("test_client"));
        }

        assert!(!limiter.check("test_client"));
    }

    #[test]
    fn test_rate_limiter_different_clients() {
        let limiter = RateLimiter::new(5);

        for _ in 0..5 {
            assert!(limiter.check("client_a"));
            assert!(limiter.check("client_b"));
        }

        assert!(!limiter.check("client_a"));
        assert!(!limiter.check("client_b"));
    }

    #[test]
    fn test_rate_limiter_cleanup() {
        let limiter = RateLimiter::new(10);

        limiter.check("client_1");
        limiter.check("client_2");

        limiter.cleanup();

        assert!(limiter.check("client_1"));
    }
}
