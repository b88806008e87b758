/// Errors raised by the persistence collaborators
///
/// Identity stores and allowance stores report infrastructure trouble
/// through [`StoreError`]. Ordinary absence is never an error; lookups
/// return `Ok(None)` instead.

use thiserror::Error;

use crate::auth::security::SecurityError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Postgres query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis command or connection failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store cannot serve requests (poisoned lock, bad state)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Unique constraint violated (username, access token)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Update targeted a row that does not exist
    #[error("User {0} does not exist")]
    UserMissing(i64),

    /// Hashing failed while building a record
    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl StoreError {
    /// Whether the failure comes from the backing service rather than the
    /// caller's input
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_)
                | StoreError::Redis(_)
                | StoreError::Unavailable(_)
                | StoreError::Security(SecurityError::TaskFailed(_))
        )
    }
}
