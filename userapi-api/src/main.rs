//! # UserAPI Server
//!
//! REST API exposing user resources behind composite authentication
//! (HTTP Basic, Bearer token, query parameter token) and per-user rate
//! limiting.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/users REDIS_URL=redis://localhost cargo run -p userapi-api
//!
//! # Development without external services
//! IDENTITY_BACKEND=memory MEMORY_SEED_USERS=alice:wonderland cargo run -p userapi-api
//! ```

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use userapi_api::app::{build_router, AppState};
use userapi_api::config::{Config, IdentityBackend, LogFormat, SeedUser};
use userapi_shared::auth::security::Security;
use userapi_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use userapi_shared::models::user::CreateUser;
use userapi_shared::ratelimit::memory::MemoryAllowanceStore;
use userapi_shared::ratelimit::redis_store::RedisAllowanceStore;
use userapi_shared::ratelimit::AllowanceStore;
use userapi_shared::store::memory::MemoryIdentityStore;
use userapi_shared::store::postgres::PgIdentityStore;
use userapi_shared::store::IdentityStore;

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "userapi_api=debug,userapi_shared=info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Registration input for a configured seed account
fn seed_user(seed: &SeedUser) -> CreateUser {
    CreateUser {
        username: seed.username.clone(),
        email: format!("{}@localhost", seed.username),
        password: seed.password.clone(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    tracing::info!("UserAPI Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let security = Security::default();

    let (users, pool) = match config.identity_backend {
        IdentityBackend::Postgres => {
            let url = config
                .database
                .url
                .clone()
                .context("DATABASE_URL environment variable is required")?;

            if !config.seed_users.is_empty() {
                tracing::warn!("MEMORY_SEED_USERS ignored with the postgres identity backend");
            }

            let pool = create_pool(DatabaseConfig {
                max_connections: config.database.max_connections,
                ..DatabaseConfig::new(url)
            })
            .await
            .context("Failed to create database pool")?;

            let store: Arc<dyn IdentityStore> = Arc::new(PgIdentityStore::new(pool.clone()));
            (store, Some(pool))
        }
        IdentityBackend::Memory => {
            tracing::warn!("Using in-memory identity store; users are lost on restart");
            let store = MemoryIdentityStore::new();

            for seed in &config.seed_users {
                let user = store
                    .create(seed_user(seed), &security)
                    .await
                    .context("Failed to seed user")?;
                tracing::info!(user_id = user.id, username = %user.username, "Seeded user");
            }

            let store: Arc<dyn IdentityStore> = Arc::new(store);
            (store, None)
        }
    };

    let allowances: Arc<dyn AllowanceStore> = match &config.redis.url {
        Some(url) => Arc::new(
            RedisAllowanceStore::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set; rate limit counters are local to this process");
            Arc::new(MemoryAllowanceStore::new())
        }
    };

    let bind_address = config.bind_address();
    tracing::info!(
        auth_methods = ?config.auth.methods,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    let state = AppState::new(config, users, allowances, security);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(pool) = pool {
        close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
