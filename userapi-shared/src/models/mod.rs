/// Database models
///
/// - `user`: user accounts, credentials and status
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
/// assert!(user.is_active());
/// # Ok(())
/// # }
/// ```

pub mod user;
