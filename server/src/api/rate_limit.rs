//! Rate limiting middleware for API routes

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::data::counters::{RateLimitBucket, RateLimitResult, RateLimiter};

/// Rate limit middleware state
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub bucket: RateLimitBucket,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody {
    error: &'static str,
    message: String,
    retry_after: u64,
}

/// Rate limit exceeded response
pub struct RateLimitExceeded(RateLimitResult);

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let r = &self.0;
        let retry_after = r.retry_after.unwrap_or(r.window_secs);
        let body = RateLimitBody {
            error: "Rate limit exceeded",
            message: format!(
                "Too many requests. Limit: {} per {}s",
                r.limit, r.window_secs
            ),
            retry_after,
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        add_rate_limit_headers(response.headers_mut(), r);
        if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, v);
        }
        response
    }
}

/// Add rate limit headers to response
fn add_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    if let Ok(v) = HeaderValue::from_str(&result.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.reset_at_ms.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
}

/// Client identity: first X-Forwarded-For hop, then the peer address
fn client_identity(request: &Request) -> String {
    request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware function
///
/// Counter store failures admit the request without rate limit headers.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let identity = client_identity(&request);

    let Some(result) = state.limiter.check(&state.bucket, &identity).await else {
        return Ok(next.run(request).await);
    };

    if !result.allowed {
        tracing::warn!(
            bucket = state.bucket.name,
            %identity,
            limit = result.limit,
            "Rate limit exceeded"
        );
        return Err(RateLimitExceeded(result));
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(response.headers_mut(), &result);
    Ok(response)
}
