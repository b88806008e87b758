/// Composite authentication
///
/// A [`CompositeAuth`] is an ordered list of [`AuthMethod`]s. For each
/// request the [`Authenticator`] walks the list in order:
///
/// 1. A method with no credential in the request is skipped.
/// 2. A method whose credential resolves to an active user wins, and no
///    further methods run.
/// 3. A method whose credential is present but does not resolve falls
///    through to the next method, or rejects the request immediately when
///    `short_circuit` is set.
///
/// If nothing wins the request is unauthenticated. The rejection carries a
/// `WWW-Authenticate` challenge for every header based method.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use axum::http::{HeaderMap, Uri};
/// use userapi_shared::auth::composite::{AuthMethod, Authenticator, CompositeAuth};
/// use userapi_shared::auth::security::Security;
/// use userapi_shared::store::memory::MemoryIdentityStore;
///
/// # async fn example() {
/// let auth = CompositeAuth::new(vec![AuthMethod::Bearer, AuthMethod::query_param("access-token")]);
/// let authenticator = Authenticator::new(auth, Arc::new(MemoryIdentityStore::new()), Security::default());
///
/// let uri: Uri = "/v1/users?access-token=unknown".parse().unwrap();
/// assert!(authenticator.authenticate(&HeaderMap::new(), &uri).await.is_err());
/// # }
/// ```

use axum::http::{HeaderMap, Uri};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::credentials::{basic_credentials, bearer_token, query_token};
use super::middleware::{AuthContext, AuthError};
use super::security::{Security, SecurityError};
use crate::error::StoreError;
use crate::models::user::User;
use crate::store::IdentityStore;

/// Query parameter read by [`AuthMethod::QueryParam`] unless configured otherwise
pub const DEFAULT_QUERY_PARAM: &str = "access-token";

/// Realm announced in challenges
pub const DEFAULT_REALM: &str = "api";

/// Which method authenticated a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethodKind {
    Basic,
    Bearer,
    QueryParam,
}

/// One way of carrying credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Basic base64(username:password)`
    Basic,

    /// `Authorization: Bearer <access token>`
    Bearer,

    /// `?<param>=<access token>`
    QueryParam { param: String },
}

/// Credential as read from the request, not yet checked
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    UsernamePassword { username: String, password: String },
    AccessToken(String),
}

// Keeps secrets out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .finish_non_exhaustive(),
            Credential::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

impl AuthMethod {
    pub fn query_param(param: impl Into<String>) -> Self {
        AuthMethod::QueryParam { param: param.into() }
    }

    /// Parses a configured method name (`basic`, `bearer`, `query`)
    pub fn from_name(name: &str, query_param: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(AuthMethod::Basic),
            "bearer" => Some(AuthMethod::Bearer),
            "query" | "query_param" | "queryparam" => Some(AuthMethod::query_param(query_param)),
            _ => None,
        }
    }

    pub fn kind(&self) -> AuthMethodKind {
        match self {
            AuthMethod::Basic => AuthMethodKind::Basic,
            AuthMethod::Bearer => AuthMethodKind::Bearer,
            AuthMethod::QueryParam { .. } => AuthMethodKind::QueryParam,
        }
    }

    /// Reads this method's credential from the request, if present
    pub fn extract(&self, headers: &HeaderMap, uri: &Uri) -> Option<Credential> {
        match self {
            AuthMethod::Basic => basic_credentials(headers)
                .map(|(username, password)| Credential::UsernamePassword { username, password }),
            AuthMethod::Bearer => bearer_token(headers).map(Credential::AccessToken),
            AuthMethod::QueryParam { param } => query_token(uri, param).map(Credential::AccessToken),
        }
    }

    /// `WWW-Authenticate` value for header based methods
    pub fn challenge(&self, realm: &str) -> Option<String> {
        match self {
            AuthMethod::Basic => Some(format!("Basic realm=\"{}\"", realm)),
            AuthMethod::Bearer => Some(format!("Bearer realm=\"{}\"", realm)),
            AuthMethod::QueryParam { .. } => None,
        }
    }
}

/// Ordered authentication policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeAuth {
    methods: Vec<AuthMethod>,
    short_circuit: bool,
    realm: String,
}

impl Default for CompositeAuth {
    /// Basic, then Bearer, then the `access-token` query parameter
    fn default() -> Self {
        Self::new(vec![
            AuthMethod::Basic,
            AuthMethod::Bearer,
            AuthMethod::query_param(DEFAULT_QUERY_PARAM),
        ])
    }
}

impl CompositeAuth {
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        Self {
            methods,
            short_circuit: false,
            realm: DEFAULT_REALM.to_string(),
        }
    }

    /// Rejects on the first present credential that fails to resolve
    pub fn with_short_circuit(mut self, short_circuit: bool) -> Self {
        self.short_circuit = short_circuit;
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    pub fn short_circuit(&self) -> bool {
        self.short_circuit
    }

    /// Challenges sent with a 401, in method order
    pub fn challenges(&self) -> Vec<String> {
        self.methods
            .iter()
            .filter_map(|m| m.challenge(&self.realm))
            .collect()
    }

    fn unauthenticated(&self) -> AuthError {
        AuthError::Unauthenticated {
            challenges: self.challenges(),
        }
    }
}

/// Resolves request credentials to users through an identity store
pub struct Authenticator {
    auth: CompositeAuth,
    store: Arc<dyn IdentityStore>,
    security: Security,
}

impl Authenticator {
    pub fn new(auth: CompositeAuth, store: Arc<dyn IdentityStore>, security: Security) -> Self {
        Self { auth, store, security }
    }

    pub fn policy(&self) -> &CompositeAuth {
        &self.auth
    }

    /// Authenticates one request
    ///
    /// # Errors
    ///
    /// - `AuthError::Unauthenticated` when no method produced an active user
    /// - `AuthError::Store` when the identity store failed; never downgraded
    ///   to a 401
    pub async fn authenticate(&self, headers: &HeaderMap, uri: &Uri) -> Result<AuthContext, AuthError> {
        for method in self.auth.methods() {
            let Some(credential) = method.extract(headers, uri) else {
                continue;
            };

            match self.resolve(&credential).await? {
                Some(user) => {
                    debug!(user_id = user.id, method = ?method.kind(), "Request authenticated");
                    return Ok(AuthContext::new(user, method.kind()));
                }
                None if self.auth.short_circuit() => {
                    debug!(method = ?method.kind(), "Credential rejected, short-circuiting");
                    return Err(self.auth.unauthenticated());
                }
                None => {
                    debug!(method = ?method.kind(), "Credential rejected, trying next method");
                }
            }
        }

        Err(self.auth.unauthenticated())
    }

    /// Looks up the user a credential belongs to
    pub async fn resolve(&self, credential: &Credential) -> Result<Option<User>, StoreError> {
        match credential {
            Credential::UsernamePassword { username, password } => {
                if username.is_empty() {
                    return Ok(None);
                }

                let user = self.store.find_by_username(username).await.map_err(|e| {
                    warn!(error = %e, "Identity store failed during basic auth");
                    e
                })?;

                // Unknown usernames pay for a hash too
                let stored_hash = user.as_ref().map(|u| u.password_hash.as_str());
                let valid = match self.security.verify_password_blocking(password, stored_hash).await {
                    Ok(valid) => valid,
                    Err(e @ SecurityError::TaskFailed(_)) => return Err(StoreError::from(e)),
                    Err(e) => {
                        warn!(user_id = ?user.as_ref().map(|u| u.id), error = %e, "Stored password hash is unusable");
                        false
                    }
                };

                Ok(user.filter(|_| valid))
            }
            Credential::AccessToken(token) => {
                if token.is_empty() {
                    return Ok(None);
                }

                self.store.find_by_access_token(token).await.map_err(|e| {
                    warn!(error = %e, "Identity store failed during token auth");
                    e
                })
            }
        }
    }
}
