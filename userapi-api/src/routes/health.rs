/// Health check endpoint
///
/// Public; verifies the server is running and both backing stores answer.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "identity_store": "connected",
///   "rate_limit_store": "connected"
/// }
/// ```
///
/// `status` is `degraded` when either store fails its ping. The HTTP status
/// stays 200 so the endpoint reports rather than fails.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Identity store status
    pub identity_store: String,

    /// Allowance store status
    pub rate_limit_store: String,
}

fn describe<E: std::fmt::Display>(component: &str, result: Result<(), E>) -> &'static str {
    match result {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(component, error = %e, "Health check failed");
            "disconnected"
        }
    }
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let identity_store = describe("identity_store", state.users.ping().await);
    let rate_limit_store = describe("rate_limit_store", state.rate_limiter.ping().await);

    let healthy = identity_store == "connected" && rate_limit_store == "connected";

    Ok(Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        identity_store: identity_store.to_string(),
        rate_limit_store: rate_limit_store.to_string(),
    }))
}
