/// Security primitives: password hashing and random token generation
///
/// `Security` is built once at startup and handed to every component that
/// needs to hash, verify, or mint secrets. Nothing in the crate reaches for a
/// global.
///
/// # Password hashing
///
/// - **Algorithm**: Argon2id, version 0x13
/// - **Memory**: 64 MB (65536 KB) by default
/// - **Iterations**: 3 passes
/// - **Parallelism**: 4 lanes
/// - **Output**: 32-byte hash, PHC string format
///
/// Verification reads the parameters back out of the stored PHC string, so
/// hashes produced with different cost settings keep verifying.
///
/// # Random strings
///
/// Auth keys, access tokens and the random half of password reset tokens are
/// drawn from the OS-seeded thread RNG over a base62 alphabet. Base62 keeps
/// `_` out of the random part, which the reset token format relies on.
///
/// # Example
///
/// ```
/// use userapi_shared::auth::security::Security;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let security = Security::default();
/// let hash = security.generate_password_hash("super_secret_password_123")?;
///
/// assert!(security.validate_password("super_secret_password_123", &hash)?);
/// assert!(!security.validate_password("wrong_password", &hash)?);
///
/// let token = security.generate_random_string(32);
/// assert_eq!(token.len(), 32);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, ParamsBuilder, Version,
};
use rand::Rng;

/// Default length of generated opaque secrets (auth keys, access tokens)
pub const RANDOM_STRING_LENGTH: usize = 32;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Error type for security operations
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),

    /// Blocking hashing task panicked or was cancelled
    #[error("Hashing task failed: {0}")]
    TaskFailed(String),
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Parallel lanes
    pub p_cost: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

/// Password hashing and random generation handle
#[derive(Debug, Clone)]
pub struct Security {
    params: Params,
}

impl Default for Security {
    fn default() -> Self {
        // The default cost is a valid argon2 parameter set
        Self::with_cost(HashCost::default()).unwrap_or_else(|_| Self {
            params: Params::default(),
        })
    }
}

impl Security {
    /// Creates a security handle with explicit hashing cost
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::HashError` if argon2 rejects the parameters.
    pub fn with_cost(cost: HashCost) -> Result<Self, SecurityError> {
        let params = ParamsBuilder::new()
            .m_cost(cost.m_cost)
            .t_cost(cost.t_cost)
            .p_cost(cost.p_cost)
            .output_len(32)
            .build()
            .map_err(|e| SecurityError::HashError(format!("Invalid parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password into a PHC string
    ///
    /// A fresh 16-byte salt is drawn from the OS RNG on every call, so the
    /// same password never produces the same hash twice.
    pub fn generate_password_hash(&self, password: &str) -> Result<String, SecurityError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| SecurityError::HashError(format!("Hash generation failed: {}", e)))?;

        Ok(password_hash.to_string())
    }

    /// Verifies a password against a stored PHC hash
    ///
    /// Returns `Ok(false)` for a wrong password and an error only when the
    /// stored hash cannot be parsed or verification itself fails.
    pub fn validate_password(&self, password: &str, hash: &str) -> Result<bool, SecurityError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| SecurityError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(SecurityError::VerifyError(format!("Verification failed: {}", e))),
        }
    }

    /// Burns one hash computation at the current cost and rejects
    ///
    /// Stands in for [`Security::validate_password`] when there is no stored
    /// hash to check against, so a missing account takes as long to reject
    /// as a wrong password.
    pub fn reject_password(&self, password: &str) -> bool {
        if let Err(e) = self.generate_password_hash(password) {
            tracing::warn!(error = %e, "Decoy hash failed");
        }
        false
    }

    /// Runs `f` with a clone of this handle on tokio's blocking pool
    ///
    /// Argon2 at production cost takes hundreds of milliseconds of CPU and
    /// must not run on a runtime worker.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T, SecurityError>
    where
        F: FnOnce(Security) -> T + Send + 'static,
        T: Send + 'static,
    {
        let security = self.clone();
        tokio::task::spawn_blocking(move || f(security))
            .await
            .map_err(|e| SecurityError::TaskFailed(e.to_string()))
    }

    /// Verifies a password on the blocking pool
    ///
    /// With no stored hash the work of a verification is still spent and
    /// the result is `Ok(false)`.
    pub async fn verify_password_blocking(&self, password: &str, hash: Option<&str>) -> Result<bool, SecurityError> {
        let password = password.to_string();
        let hash = hash.map(str::to_string);

        self.run_blocking(move |security| match hash {
            Some(hash) => security.validate_password(&password, &hash),
            None => Ok(security.reject_password(&password)),
        })
        .await?
    }

    /// Generates a random base62 string of `length` characters
    pub fn generate_random_string(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();

        (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}
