/// User model: the only persisted entity
///
/// Users are never physically deleted. Deletion flips `status` to
/// [`UserStatus::Deleted`] and every identity resolution path then treats
/// the row as absent.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE "user" (
///     id BIGSERIAL PRIMARY KEY,
///     username VARCHAR(255) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     auth_key VARCHAR(64) NOT NULL,
///     access_token VARCHAR(64) NOT NULL UNIQUE,
///     password_reset_token VARCHAR(255) UNIQUE,
///     status SMALLINT NOT NULL DEFAULT 10,
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```
///
/// # Serialization
///
/// `auth_key`, `password_hash`, `password_reset_token` and `access_token`
/// are skipped by `Serialize`. A serialized user is safe to hand to any
/// client.
///
/// # Example
///
/// ```
/// use userapi_shared::auth::security::Security;
/// use userapi_shared::models::user::{CreateUser, User};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let security = Security::default();
/// let user = User::new(
///     1,
///     CreateUser {
///         username: "alice".to_string(),
///         email: "alice@example.com".to_string(),
///         password: "correct horse".to_string(),
///     },
///     &security,
/// )?;
///
/// assert!(user.validate_password(&security, "correct horse"));
/// let json = serde_json::to_string(&user)?;
/// assert!(!json.contains(&user.auth_key));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::security::{Security, SecurityError, RANDOM_STRING_LENGTH};
use crate::ratelimit::{RateLimit, RateLimitable};

/// Account status stored in the `status` column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Soft-deleted; invisible to identity lookups
    Deleted,

    /// Regular account
    #[default]
    Active,
}

impl UserStatus {
    /// Converts status to its column value
    pub fn as_i16(&self) -> i16 {
        match self {
            UserStatus::Deleted => 0,
            UserStatus::Active => 10,
        }
    }

    /// Parses status from its column value
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(UserStatus::Deleted),
            10 => Some(UserStatus::Active),
            _ => None,
        }
    }
}

/// User account
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    /// Primary key, assigned by the store
    pub id: i64,

    /// Unique login name
    pub username: String,

    /// Contact address
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// "Remember me" secret
    #[serde(skip_serializing)]
    pub auth_key: String,

    /// Opaque bearer token for stateless API access
    #[serde(skip_serializing)]
    pub access_token: String,

    /// `<random>_<unix-ts>` while a reset is pending
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,

    /// Raw status column, see [`UserStatus`]
    pub status: i16,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    /// Plaintext; hashed before it ever reaches a store
    pub password: String,
}

/// Identity capability: what the authenticator needs from a resolved user
pub trait Identity {
    /// Stable identifier
    fn id(&self) -> i64;

    /// Current "remember me" key
    fn auth_key(&self) -> &str;

    /// Compares a candidate against the current auth key
    fn validate_auth_key(&self, candidate: &str) -> bool {
        self.auth_key() == candidate
    }
}

/// Timestamp hooks run by stores before persisting
pub trait Timestamps {
    /// Called once, before the first insert
    fn before_insert(&mut self, now: DateTime<Utc>);

    /// Called before every update
    fn before_update(&mut self, now: DateTime<Utc>);
}

impl User {
    /// Builds a new active user with hashed password and fresh secrets
    ///
    /// `id` is whatever the store assigns; timestamps are left at the
    /// epoch until the store runs [`Timestamps::before_insert`].
    pub fn new(id: i64, data: CreateUser, security: &Security) -> Result<Self, SecurityError> {
        let mut user = User {
            id,
            username: data.username,
            email: data.email,
            password_hash: String::new(),
            auth_key: String::new(),
            access_token: security.generate_random_string(RANDOM_STRING_LENGTH),
            password_reset_token: None,
            status: UserStatus::default().as_i16(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        };

        user.set_password(security, &data.password)?;
        user.generate_auth_key(security);

        Ok(user)
    }

    /// [`User::new`] with the password hashed on the blocking pool
    pub async fn build(data: CreateUser, security: &Security) -> Result<Self, SecurityError> {
        security
            .run_blocking(move |security| User::new(0, data, &security))
            .await?
    }

    /// Parsed status, `None` for values outside the known set
    pub fn get_status(&self) -> Option<UserStatus> {
        UserStatus::from_i16(self.status)
    }

    pub fn is_active(&self) -> bool {
        self.get_status() == Some(UserStatus::Active)
    }

    /// Marks the user deleted; the row stays
    pub fn soft_delete(&mut self) {
        self.status = UserStatus::Deleted.as_i16();
    }

    /// Checks a plaintext password against the stored hash
    ///
    /// A stored hash that fails to parse counts as a mismatch.
    pub fn validate_password(&self, security: &Security, password: &str) -> bool {
        match security.validate_password(password, &self.password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(user_id = self.id, error = %e, "Stored password hash is unusable");
                false
            }
        }
    }

    /// Replaces the password hash; the plaintext is never stored
    pub fn set_password(&mut self, security: &Security, password: &str) -> Result<(), SecurityError> {
        self.password_hash = security.generate_password_hash(password)?;
        Ok(())
    }

    /// Assigns a fresh "remember me" key
    pub fn generate_auth_key(&mut self, security: &Security) {
        self.auth_key = security.generate_random_string(RANDOM_STRING_LENGTH);
    }

    /// Issues `<random>_<now>` as the pending reset token
    pub fn generate_password_reset_token(&mut self, security: &Security, now: i64) {
        self.password_reset_token = Some(format!(
            "{}_{}",
            security.generate_random_string(RANDOM_STRING_LENGTH),
            now
        ));
    }

    pub fn remove_password_reset_token(&mut self) {
        self.password_reset_token = None;
    }

    /// Checks whether a reset token is still inside its validity window
    ///
    /// The issuance time is the integer after the last `_`. A token with no
    /// `_` or a non-numeric suffix is read as issued at 0, i.e. long
    /// expired. Empty tokens are never valid.
    pub fn is_password_reset_token_valid(token: &str, expire_secs: i64, now: i64) -> bool {
        if token.is_empty() {
            return false;
        }

        let issued_at = token
            .rfind('_')
            .and_then(|idx| token[idx + 1..].parse::<i64>().ok())
            .unwrap_or(0);

        issued_at.saturating_add(expire_secs) >= now
    }
}

impl Identity for User {
    fn id(&self) -> i64 {
        self.id
    }

    fn auth_key(&self) -> &str {
        &self.auth_key
    }
}

impl Timestamps for User {
    fn before_insert(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    fn before_update(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl RateLimitable for User {
    fn rate_limit_key(&self) -> String {
        format!("user:{}", self.id)
    }

    fn rate_limit(&self, _action: &str, default: RateLimit) -> RateLimit {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::security::HashCost;

    fn security() -> Security {
        Security::with_cost(HashCost {
            m_cost: 1024,
            t_cost: 1,
            p_cost: 1,
        })
        .unwrap()
    }

    fn user(security: &Security) -> User {
        User::new(
            7,
            CreateUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "s3cret-pass".to_string(),
            },
            security,
        )
        .unwrap()
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(UserStatus::Active.as_i16(), 10);
        assert_eq!(UserStatus::Deleted.as_i16(), 0);
        assert_eq!(UserStatus::from_i16(10), Some(UserStatus::Active));
        assert_eq!(UserStatus::from_i16(0), Some(UserStatus::Deleted));
        assert_eq!(UserStatus::from_i16(5), None);
        assert_eq!(UserStatus::default(), UserStatus::Active);
    }

    #[test]
    fn test_new_user_defaults() {
        let security = security();
        let user = user(&security);

        assert!(user.is_active());
        assert_eq!(user.auth_key.len(), RANDOM_STRING_LENGTH);
        assert_eq!(user.access_token.len(), RANDOM_STRING_LENGTH);
        assert!(user.password_reset_token.is_none());
        assert_ne!(user.password_hash, "s3cret-pass");
    }

    #[tokio::test]
    async fn test_build_hashes_off_runtime() {
        let security = security();
        let user = User::build(
            CreateUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "secret".to_string(),
            },
            &security,
        )
        .await
        .unwrap();

        assert_eq!(user.id, 0);
        assert!(user.is_active());
        assert!(user.validate_password(&security, "secret"));
    }

    #[test]
    fn test_validate_password() {
        let security = security();
        let mut user = user(&security);

        assert!(user.validate_password(&security, "s3cret-pass"));
        assert!(!user.validate_password(&security, "S3cret-pass"));

        user.set_password(&security, "new-pass").unwrap();
        assert!(user.validate_password(&security, "new-pass"));
        assert!(!user.validate_password(&security, "s3cret-pass"));
    }

    #[test]
    fn test_validate_password_with_corrupt_hash() {
        let security = security();
        let mut user = user(&security);
        user.password_hash = "s3cret-pass".to_string();

        assert!(!user.validate_password(&security, "s3cret-pass"));
    }

    #[test]
    fn test_validate_auth_key() {
        let security = security();
        let mut user = user(&security);
        let key = user.auth_key.clone();

        assert!(user.validate_auth_key(&key));
        assert!(!user.validate_auth_key(&format!("{}x", key)));
        assert!(!user.validate_auth_key(&key[..10]));
        assert!(!user.validate_auth_key(""));

        user.generate_auth_key(&security);
        assert!(!user.validate_auth_key(&key));
    }

    #[test]
    fn test_reset_token_lifecycle() {
        let security = security();
        let mut user = user(&security);

        user.generate_password_reset_token(&security, 1_700_000_000);
        let token = user.password_reset_token.clone().unwrap();
        assert!(token.ends_with("_1700000000"));
        assert!(User::is_password_reset_token_valid(&token, 3600, 1_700_000_000));

        user.remove_password_reset_token();
        assert!(user.password_reset_token.is_none());
    }

    #[test]
    fn test_reset_token_empty_and_malformed() {
        assert!(!User::is_password_reset_token_valid("", 3600, 1_700_000_000));
        assert!(!User::is_password_reset_token_valid("abc", 3600, 1_700_000_000));
        assert!(!User::is_password_reset_token_valid("abc_", 3600, 1_700_000_000));
        assert!(!User::is_password_reset_token_valid("abc_xyz", 3600, 1_700_000_000));
        assert!(!User::is_password_reset_token_valid("_", 3600, 1_700_000_000));
        // A bare timestamp has no separator and is not a token
        assert!(!User::is_password_reset_token_valid("1700000000", 3600, 1_700_000_000));
    }

    #[test]
    fn test_reset_token_expiry_boundary() {
        let issued = 1_700_000_000;
        let token = format!("Ab3dE_{}", issued);

        assert!(User::is_password_reset_token_valid(&token, 3600, issued));
        assert!(User::is_password_reset_token_valid(&token, 3600, issued + 3600));
        assert!(!User::is_password_reset_token_valid(&token, 3600, issued + 3601));
    }

    #[test]
    fn test_reset_token_uses_last_separator() {
        let token = "part_one_part_two_1700000000";
        assert!(User::is_password_reset_token_valid(token, 10, 1_700_000_010));
    }

    #[test]
    fn test_timestamps_hooks() {
        let security = security();
        let mut user = user(&security);
        let created = Utc::now();

        user.before_insert(created);
        assert_eq!(user.created_at, created);
        assert_eq!(user.updated_at, created);

        let later = created + chrono::Duration::seconds(30);
        user.before_update(later);
        assert_eq!(user.created_at, created);
        assert_eq!(user.updated_at, later);
    }

    #[test]
    fn test_soft_delete() {
        let security = security();
        let mut user = user(&security);
        user.soft_delete();

        assert!(!user.is_active());
        assert_eq!(user.status, 0);
    }

    #[test]
    fn test_serialization_excludes_secrets() {
        let security = security();
        let mut user = user(&security);
        user.generate_password_reset_token(&security, 1_700_000_000);

        let json = serde_json::to_string(&user).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(!json.contains(&user.auth_key));
        assert!(!json.contains(&user.password_hash));
        assert!(!json.contains(user.password_reset_token.as_deref().unwrap()));
        assert!(!json.contains(&user.access_token));
        assert!(value.get("auth_key").is_none());
        assert!(value.get("password_hash").is_none());
        assert!(value.get("password_reset_token").is_none());
        assert_eq!(value["username"], "alice");
        assert_eq!(value["status"], 10);
    }

    #[test]
    fn test_rate_limit_is_fixed_default() {
        let security = security();
        let user = user(&security);
        let default = RateLimit::new(100, 60);

        assert_eq!(user.rate_limit("view", default), default);
        assert_eq!(user.rate_limit("index", default), default);
        assert_eq!(user.rate_limit_key(), "user:7");
    }
}
