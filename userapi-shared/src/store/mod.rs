/// Identity store: resolves credentials to users
///
/// Every lookup that can hand back a user filters on
/// [`UserStatus::Active`](crate::models::user::UserStatus). A soft-deleted
/// user is invisible to id, username, access token and reset token
/// resolution alike. Absence is `Ok(None)`; `Err` always means the backing
/// store failed.
///
/// # Implementations
///
/// - [`postgres::PgIdentityStore`]: sqlx over PostgreSQL
/// - [`memory::MemoryIdentityStore`]: in-process map for development and tests
///
/// # Example
///
/// ```
/// use userapi_shared::auth::security::Security;
/// use userapi_shared::models::user::CreateUser;
/// use userapi_shared::store::{memory::MemoryIdentityStore, IdentityStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryIdentityStore::new();
/// let security = Security::default();
///
/// let user = store
///     .create(
///         CreateUser {
///             username: "alice".to_string(),
///             email: "alice@example.com".to_string(),
///             password: "correct horse".to_string(),
///         },
///         &security,
///     )
///     .await?;
///
/// let found = store.find_by_access_token(&user.access_token).await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::Utc;

use crate::auth::security::Security;
use crate::error::StoreError;
use crate::models::user::{CreateUser, User};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Active user with this id
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Active user holding exactly this access token
    async fn find_by_access_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// Active user with this username
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Active user holding exactly this reset token, expiry not checked
    async fn find_active_by_password_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// Inserts a new active user, running the insert timestamp hook
    async fn create(&self, data: CreateUser, security: &Security) -> Result<User, StoreError>;

    /// Persists every mutable field of `user`, running the update hook
    async fn save(&self, user: &mut User) -> Result<(), StoreError>;

    /// Active users ordered by id
    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError>;

    async fn count_active(&self) -> Result<i64, StoreError>;

    /// Checks the backing store is reachable
    async fn ping(&self) -> Result<(), StoreError>;

    /// Active user holding a still-valid reset token, as of `now`
    async fn find_by_password_reset_token_at(
        &self,
        token: &str,
        expire_secs: i64,
        now: i64,
    ) -> Result<Option<User>, StoreError> {
        if !User::is_password_reset_token_valid(token, expire_secs, now) {
            return Ok(None);
        }

        self.find_active_by_password_reset_token(token).await
    }

    /// Active user holding a still-valid reset token
    async fn find_by_password_reset_token(&self, token: &str, expire_secs: i64) -> Result<Option<User>, StoreError> {
        self.find_by_password_reset_token_at(token, expire_secs, Utc::now().timestamp())
            .await
    }
}
