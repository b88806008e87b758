/// PostgreSQL identity store
///
/// Reads and writes the `"user"` table documented in
/// [`crate::models::user`]. Timestamps come from the model's hooks rather
/// than column defaults, so the in-memory and Postgres stores agree on when
/// `created_at` and `updated_at` move.
///
/// # Example
///
/// ```no_run
/// use userapi_shared::db::pool::{create_pool, DatabaseConfig};
/// use userapi_shared::store::{postgres::PgIdentityStore, IdentityStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgIdentityStore::new(pool);
/// if let Some(user) = store.find_by_username("alice").await? {
///     println!("Found user {}", user.id);
/// }
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::IdentityStore;
use crate::auth::security::Security;
use crate::error::StoreError;
use crate::models::user::{CreateUser, Timestamps, User, UserStatus};

const USER_COLUMNS: &str = "id, username, email, password_hash, auth_key, access_token, \
                            password_reset_token, status, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetches one active user where `column = value`
    ///
    /// `column` is always one of the fixed names below, never caller input.
    async fn find_active_by(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let query = format!(
            r#"SELECT {} FROM "user" WHERE {} = $1 AND status = $2"#,
            USER_COLUMNS, column
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(value)
            .bind(UserStatus::Active.as_i16())
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}

/// Maps unique violations onto `Conflict`, everything else stays a database fault
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(constraint) = db_err.constraint() {
            return StoreError::Conflict(format!("Constraint violation: {}", constraint));
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let query = format!(
            r#"SELECT {} FROM "user" WHERE id = $1 AND status = $2"#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(UserStatus::Active.as_i16())
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.find_active_by("access_token", token).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_active_by("username", username).await
    }

    async fn find_active_by_password_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.find_active_by("password_reset_token", token).await
    }

    async fn create(&self, data: CreateUser, security: &Security) -> Result<User, StoreError> {
        let mut draft = User::build(data, security).await?;
        draft.before_insert(Utc::now());

        let query = format!(
            r#"
            INSERT INTO "user" (username, email, password_hash, auth_key, access_token,
                                password_reset_token, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(&draft.username)
            .bind(&draft.email)
            .bind(&draft.password_hash)
            .bind(&draft.auth_key)
            .bind(&draft.access_token)
            .bind(&draft.password_reset_token)
            .bind(draft.status)
            .bind(draft.created_at)
            .bind(draft.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;

        tracing::debug!(user_id = user.id, "Created user");
        Ok(user)
    }

    async fn save(&self, user: &mut User) -> Result<(), StoreError> {
        let mut updated = user.clone();
        updated.before_update(Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE "user"
            SET username = $2, email = $3, password_hash = $4, auth_key = $5,
                access_token = $6, password_reset_token = $7, status = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(updated.id)
        .bind(&updated.username)
        .bind(&updated.email)
        .bind(&updated.password_hash)
        .bind(&updated.auth_key)
        .bind(&updated.access_token)
        .bind(&updated.password_reset_token)
        .bind(updated.status)
        .bind(updated.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserMissing(user.id));
        }

        *user = updated;
        Ok(())
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let query = format!(
            r#"SELECT {} FROM "user" WHERE status = $1 ORDER BY id LIMIT $2 OFFSET $3"#,
            USER_COLUMNS
        );

        let users = sqlx::query_as::<_, User>(&query)
            .bind(UserStatus::Active.as_i16())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn count_active(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM "user" WHERE status = $1"#)
            .bind(UserStatus::Active.as_i16())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::db::pool::health_check(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_columns_match_model() {
        for column in [
            "id",
            "username",
            "email",
            "password_hash",
            "auth_key",
            "access_token",
            "password_reset_token",
            "status",
            "created_at",
            "updated_at",
        ] {
            assert!(USER_COLUMNS.contains(column), "missing column {}", column);
        }
    }

    #[test]
    fn test_map_write_error_keeps_non_constraint_errors() {
        let err = map_write_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(err.is_unavailable());
    }

    // Query tests against a live database are in tests/pg_identity_store_tests.rs
}
