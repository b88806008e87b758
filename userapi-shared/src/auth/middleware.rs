/// Authentication middleware for Axum
///
/// [`composite_auth_middleware`] runs the [`Authenticator`] for every
/// request on the routes it wraps. On success the resolved
/// [`AuthContext`] is added to the request extensions; on failure the
/// request never reaches the handler.
///
/// # Request Extensions
///
/// After successful authentication the middleware adds:
/// - `AuthContext`: the authenticated user and the method that matched
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{middleware, routing::get, Extension, Router};
/// use userapi_shared::auth::composite::{Authenticator, CompositeAuth};
/// use userapi_shared::auth::middleware::{composite_auth_middleware, AuthContext};
/// use userapi_shared::auth::security::Security;
/// use userapi_shared::store::memory::MemoryIdentityStore;
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, {}!", auth.user.username)
/// }
///
/// let authenticator = Arc::new(Authenticator::new(
///     CompositeAuth::default(),
///     Arc::new(MemoryIdentityStore::new()),
///     Security::default(),
/// ));
///
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .route_layer(middleware::from_fn_with_state(authenticator, composite_auth_middleware));
/// ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use super::composite::{AuthMethodKind, Authenticator};
use crate::error::StoreError;
use crate::models::user::User;

/// Authentication context added to request extensions
///
/// Handlers extract it with Axum's `Extension` extractor.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated, active user
    pub user: User,

    /// Method whose credential resolved
    pub method: AuthMethodKind,
}

impl AuthContext {
    pub fn new(user: User, method: AuthMethodKind) -> Self {
        Self { user, method }
    }
}

/// Error type for authentication
#[derive(Debug, Error)]
pub enum AuthError {
    /// No configured method produced an active user
    #[error("Unauthenticated")]
    Unauthenticated {
        /// `WWW-Authenticate` values to send back
        challenges: Vec<String>,
    },

    /// Identity store failed while resolving a credential
    #[error("Identity store failure: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthenticated { challenges } => {
                let body = Json(json!({
                    "error": "unauthorized",
                    "message": "Your request was made with invalid credentials.",
                }));
                let mut response = (StatusCode::UNAUTHORIZED, body).into_response();

                for challenge in challenges {
                    if let Ok(value) = HeaderValue::from_str(&challenge) {
                        response.headers_mut().append(header::WWW_AUTHENTICATE, value);
                    }
                }
                response
            }
            AuthError::Store(e) => {
                error!(error = %e, "Authentication unavailable");
                let body = Json(json!({
                    "error": "service_unavailable",
                    "message": "Authentication service unavailable",
                }));
                (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
            }
        }
    }
}

/// Composite authentication middleware
///
/// Use with `axum::middleware::from_fn_with_state`, passing the shared
/// [`Authenticator`].
///
/// # Errors
///
/// - 401 Unauthorized with `WWW-Authenticate` challenges if no method
///   authenticated the request
/// - 503 Service Unavailable if the identity store failed
pub async fn composite_auth_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_context = authenticator.authenticate(req.headers(), req.uri()).await?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_response() {
        let err = AuthError::Unauthenticated {
            challenges: vec!["Basic realm=\"api\"".to_string(), "Bearer realm=\"api\"".to_string()],
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenges: Vec<_> = response
            .headers()
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(challenges, vec!["Basic realm=\"api\"", "Bearer realm=\"api\""]);
    }

    #[test]
    fn test_store_failure_is_503() {
        let err = AuthError::from(StoreError::Unavailable("down".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
