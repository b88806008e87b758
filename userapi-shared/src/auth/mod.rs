/// Authentication utilities
///
/// # Modules
///
/// - [`security`]: Argon2id password hashing and random token generation
/// - [`credentials`]: Basic, Bearer and query parameter credential extraction
/// - [`composite`]: ordered multi-method authentication policy
/// - [`middleware`]: Axum middleware and the `AuthContext` extension
///
/// # Security Features
///
/// - **Password Hashing**: Argon2id, 64 MB memory, 3 iterations by default
/// - **Tokens**: 32 character base62 strings from a CSPRNG
/// - **Uniform Failures**: unknown user and wrong password produce the same 401
///
/// # Example
///
/// ```no_run
/// use userapi_shared::auth::security::Security;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let security = Security::default();
/// let hash = security.generate_password_hash("user_password")?;
/// assert!(security.validate_password("user_password", &hash)?);
/// # Ok(())
/// # }
/// ```

pub mod composite;
pub mod credentials;
pub mod middleware;
pub mod security;
