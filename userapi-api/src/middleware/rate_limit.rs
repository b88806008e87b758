/// Rate limiting middleware for authenticated routes
///
/// Runs after authentication and spends one token from the authenticated
/// user's bucket per request. The quota comes from the user's
/// [`RateLimitable`](userapi_shared::ratelimit::RateLimitable) capability,
/// which by default is the configured 100 requests per 60 seconds.
///
/// # Headers
///
/// When `RATE_LIMIT_HEADERS` is on, every response carries:
/// - `X-Rate-Limit-Limit`: bucket capacity
/// - `X-Rate-Limit-Remaining`: whole tokens left
/// - `X-Rate-Limit-Reset`: seconds until the bucket is full again
///
/// A 429 additionally carries `Retry-After`, in seconds, regardless of the
/// header setting.
///
/// # Failures
///
/// An unreachable allowance store yields 503. The request is never let
/// through unmetered.

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Extension, MatchedPath, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use userapi_shared::auth::middleware::AuthContext;
use userapi_shared::ratelimit::RateLimitDecision;

pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");

fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(decision.reset_after));
}

/// Action name passed to the quota lookup, e.g. `GET /v1/users/:id`
fn action_name(request: &Request, matched_path: Option<&MatchedPath>) -> String {
    let path = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    format!("{} {}", request.method(), path)
}

/// Rate limiting middleware layer
///
/// Must be mounted inside the authentication layer; it reads the
/// `AuthContext` that layer inserts.
///
/// # Errors
///
/// - 429 Too Many Requests: bucket empty
/// - 503 Service Unavailable: allowance store failure
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let action = action_name(&request, matched_path.as_ref());

    let decision = state
        .rate_limiter
        .check(&auth.user, &action, Utc::now().timestamp())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = auth.user.id, "Rate limit check failed");
            ApiError::ServiceUnavailable("Rate limit service unavailable".to_string())
        })?;

    let headers_enabled = state.config.rate_limit.enable_headers;

    if !decision.allowed {
        tracing::info!(
            user_id = auth.user.id,
            action = %action,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: "Rate limit exceeded.".to_string(),
        }
        .into_response();

        if headers_enabled {
            add_rate_limit_headers(response.headers_mut(), &decision);
        }
        return Ok(response);
    }

    let mut response = next.run(request).await;

    if headers_enabled {
        add_rate_limit_headers(response.headers_mut(), &decision);
    }

    Ok(response)
}
