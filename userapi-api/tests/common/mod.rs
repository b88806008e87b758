/// Common test utilities for integration tests
///
/// Builds the full router over in-memory stores so tests run without
/// PostgreSQL or Redis:
/// - Test configuration from an explicit variable list
/// - Test user creation
/// - Request helpers for each credential style

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower::ServiceExt;
use userapi_api::app::{build_router, AppState};
use userapi_api::config::Config;
use userapi_shared::auth::security::{HashCost, Security};
use userapi_shared::error::StoreError;
use userapi_shared::models::user::{CreateUser, User};
use userapi_shared::ratelimit::memory::MemoryAllowanceStore;
use userapi_shared::ratelimit::{Allowance, AllowanceStore, RateLimit, RateLimitDecision};
use userapi_shared::store::memory::MemoryIdentityStore;
use userapi_shared::store::IdentityStore;

pub const PASSWORD: &str = "correct-horse-battery";

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: axum::Router,
    pub store: Arc<MemoryIdentityStore>,
    pub security: Security,
}

impl TestContext {
    /// Default configuration on the memory backend
    pub fn new() -> Self {
        Self::with_env(&[])
    }

    /// Memory backend plus the given variable overrides
    pub fn with_env(vars: &[(&str, &str)]) -> Self {
        Self::with_allowances(vars, Arc::new(MemoryAllowanceStore::new()))
    }

    /// Memory identity store with a caller-chosen allowance store
    pub fn with_allowances(vars: &[(&str, &str)], allowances: Arc<dyn AllowanceStore>) -> Self {
        let security = fast_security();
        let store = Arc::new(MemoryIdentityStore::new());
        let state = AppState::new(test_config(vars), store.clone(), allowances, security.clone());

        Self {
            app: build_router(state),
            store,
            security,
        }
    }

    /// Creates an active user whose password is [`PASSWORD`]
    pub async fn create_user(&self, username: &str) -> User {
        self.store
            .create(
                CreateUser {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    password: PASSWORD.to_string(),
                },
                &self.security,
            )
            .await
            .expect("create test user")
    }

    /// Soft-deletes a user in the store
    pub async fn delete_user(&self, user: &User) {
        let mut user = user.clone();
        user.soft_delete();
        self.store.save(&mut user).await.expect("delete test user");
    }

    /// Persists local changes to a user
    pub async fn save_user(&self, user: &mut User) {
        self.store.save(user).await.expect("save test user");
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.expect("router is infallible")
    }
}

/// Router whose identity store fails every call
pub fn app_with_failing_identity_store() -> axum::Router {
    let state = AppState::new(
        test_config(&[]),
        Arc::new(FailingIdentityStore),
        Arc::new(MemoryAllowanceStore::new()),
        fast_security(),
    );
    build_router(state)
}

fn test_config(vars: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("IDENTITY_BACKEND".to_string(), "memory".to_string());
    for (key, value) in vars {
        env.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| env.get(key).cloned()).expect("valid test config")
}

fn fast_security() -> Security {
    Security::with_cost(HashCost {
        m_cost: 1024,
        t_cost: 1,
        p_cost: 1,
    })
    .expect("valid hash cost")
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

/// Identity store standing in for an unreachable database
pub struct FailingIdentityStore;

#[async_trait]
impl IdentityStore for FailingIdentityStore {
    async fn find_by_id(&self, _id: i64) -> Result<Option<User>, StoreError> {
        Err(unavailable())
    }

    async fn find_by_access_token(&self, _token: &str) -> Result<Option<User>, StoreError> {
        Err(unavailable())
    }

    async fn find_by_username(&self, _username: &str) -> Result<Option<User>, StoreError> {
        Err(unavailable())
    }

    async fn find_active_by_password_reset_token(&self, _token: &str) -> Result<Option<User>, StoreError> {
        Err(unavailable())
    }

    async fn create(&self, _data: CreateUser, _security: &Security) -> Result<User, StoreError> {
        Err(unavailable())
    }

    async fn save(&self, _user: &mut User) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn list_active(&self, _limit: i64, _offset: i64) -> Result<Vec<User>, StoreError> {
        Err(unavailable())
    }

    async fn count_active(&self) -> Result<i64, StoreError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

/// Allowance store standing in for an unreachable Redis
pub struct FailingAllowanceStore;

#[async_trait]
impl AllowanceStore for FailingAllowanceStore {
    async fn load_allowance(&self, _key: &str) -> Result<Option<Allowance>, StoreError> {
        Err(unavailable())
    }

    async fn save_allowance(&self, _key: &str, _allowance: Allowance, _limit: RateLimit) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn consume(&self, _key: &str, _limit: RateLimit, _now: i64) -> Result<RateLimitDecision, StoreError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_basic(uri: &str, username: &str, password: &str) -> Request<Body> {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Basic {}", encoded))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
