/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use userapi_api::{app::AppState, config::Config};
/// use userapi_shared::auth::security::Security;
/// use userapi_shared::ratelimit::memory::MemoryAllowanceStore;
/// use userapi_shared::store::memory::MemoryIdentityStore;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(
///     config,
///     Arc::new(MemoryIdentityStore::new()),
///     Arc::new(MemoryAllowanceStore::new()),
///     Security::default(),
/// );
/// let app = userapi_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use userapi_shared::auth::composite::Authenticator;
use userapi_shared::auth::middleware::composite_auth_middleware;
use userapi_shared::auth::security::Security;
use userapi_shared::ratelimit::{AllowanceStore, RateLimiter};
use userapi_shared::store::IdentityStore;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// User lookups for handlers
    pub users: Arc<dyn IdentityStore>,

    /// Composite authenticator over the same identity store
    pub authenticator: Arc<Authenticator>,

    /// Per-identity rate limiter
    pub rate_limiter: RateLimiter,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the stores together according to `config`
    pub fn new(
        config: Config,
        users: Arc<dyn IdentityStore>,
        allowances: Arc<dyn AllowanceStore>,
        security: Security,
    ) -> Self {
        let authenticator = Arc::new(Authenticator::new(config.composite_auth(), users.clone(), security));
        let rate_limiter = RateLimiter::new(allowances, config.default_rate_limit());

        Self {
            users,
            authenticator,
            rate_limiter,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health               # Health check (public)
/// └── /v1/                      # API v1 (authenticated, rate limited)
///     ├── GET /users            # List active users
///     └── GET /users/:id        # View one active user
/// ```
///
/// # Middleware Stack
///
/// For `/v1` routes, outermost first:
/// 1. CORS (tower-http CorsLayer)
/// 2. Logging (tower-http TraceLayer)
/// 3. Composite authentication
/// 4. Rate limiting
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Route layers run last-added first: authenticate, then meter
    let user_routes = Router::new()
        .route("/users", get(routes::users::index))
        .route("/users/:id", get(routes::users::view))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_layer,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            composite_auth_middleware,
        ));

    let cors = build_cors(&state.config);

    Router::new()
        .merge(health_routes)
        .nest("/v1", user_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

fn build_cors(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            crate::middleware::rate_limit::X_RATE_LIMIT_LIMIT,
            crate::middleware::rate_limit::X_RATE_LIMIT_REMAINING,
            crate::middleware::rate_limit::X_RATE_LIMIT_RESET,
            header::RETRY_AFTER,
            crate::routes::users::X_PAGINATION_TOTAL_COUNT,
            crate::routes::users::X_PAGINATION_PAGE_COUNT,
            crate::routes::users::X_PAGINATION_CURRENT_PAGE,
            crate::routes::users::X_PAGINATION_PER_PAGE,
        ])
        .max_age(std::time::Duration::from_secs(3600))
}
