/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma separated allowed origins (default: *)
/// - `IDENTITY_BACKEND`: `postgres` or `memory` (default: postgres)
/// - `DATABASE_URL`: PostgreSQL connection string (required for postgres)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `REDIS_URL`: Redis for shared rate limit counters (optional)
/// - `AUTH_METHODS`: Ordered list of `basic`, `bearer`, `query` (default: all three)
/// - `AUTH_QUERY_PARAM`: Query parameter carrying the access token (default: access-token)
/// - `AUTH_SHORT_CIRCUIT`: Reject on the first failing credential (default: false)
/// - `RATE_LIMIT_MAX_REQUESTS`: Requests per window (default: 100)
/// - `RATE_LIMIT_WINDOW_SECS`: Window length (default: 60)
/// - `RATE_LIMIT_HEADERS`: Send `X-Rate-Limit-*` headers (default: true)
/// - `MEMORY_SEED_USERS`: `name:password,...` created at startup on the memory backend
/// - `LOG_FORMAT`: `text` or `json` (default: text)
/// - `RUST_LOG`: Log filter
///
/// # Example
///
/// ```no_run
/// use userapi_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use userapi_shared::auth::composite::{AuthMethod, CompositeAuth, DEFAULT_QUERY_PARAM};
use userapi_shared::ratelimit::RateLimit;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Where users are stored
    pub identity_backend: IdentityBackend,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Authentication policy
    pub auth: AuthConfig,

    /// Rate limit policy
    pub rate_limit: RateLimitConfig,

    /// Log output
    pub logging: LoggingConfig,

    /// Accounts created at startup on the memory backend
    pub seed_users: Vec<SeedUser>,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins, `*` for any
    pub cors_origins: Vec<String>,
}

/// Identity store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    Postgres,
    Memory,
}

impl FromStr for IdentityBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(IdentityBackend::Postgres),
            "memory" => Ok(IdentityBackend::Memory),
            other => anyhow::bail!("Unknown identity backend: {}", other),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: Option<String>,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL; `None` keeps rate limit state in process
    pub url: Option<String>,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Method names in the order they are tried
    pub methods: Vec<String>,

    /// Query parameter read by the `query` method
    pub query_param: String,

    /// Reject on the first present credential that does not resolve
    pub short_circuit: bool,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,

    /// Window length in seconds
    pub window_secs: u64,

    /// Whether responses carry `X-Rate-Limit-*` headers
    pub enable_headers: bool,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Unknown log format: {}", other),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Account seeded into the memory backend
#[derive(Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Parses `name:password,name:password`; entries without a name are skipped
fn parse_seed_users(raw: &str) -> Vec<SeedUser> {
    raw.split(',')
        .filter_map(|entry| entry.trim().split_once(':'))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, password)| SeedUser {
            username: name.to_string(),
            password: password.to_string(),
        })
        .collect()
}

/// Reads `key` and parses it, falling back to `default` when unset
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// A `.env` file in the working directory is read first, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use userapi_api::config::Config;
    ///
    /// let vars = HashMap::from([("IDENTITY_BACKEND", "memory"), ("API_PORT", "9000")]);
    /// let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
    /// assert_eq!(config.api.port, 9000);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;
        let cors_origins = lookup("CORS_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| vec!["*".to_string()]);

        let identity_backend = parse_or(&lookup, "IDENTITY_BACKEND", IdentityBackend::Postgres)?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if identity_backend == IdentityBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL environment variable is required when IDENTITY_BACKEND=postgres");
        }
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let redis_url = lookup("REDIS_URL").filter(|url| !url.trim().is_empty());

        let methods = lookup("AUTH_METHODS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| vec!["basic".to_string(), "bearer".to_string(), "query".to_string()]);
        let query_param = lookup("AUTH_QUERY_PARAM").unwrap_or_else(|| DEFAULT_QUERY_PARAM.to_string());
        let short_circuit = parse_or(&lookup, "AUTH_SHORT_CIRCUIT", false)?;

        if methods.is_empty() {
            anyhow::bail!("AUTH_METHODS must name at least one method");
        }
        for method in &methods {
            if AuthMethod::from_name(method, &query_param).is_none() {
                anyhow::bail!("Unknown authentication method in AUTH_METHODS: {}", method);
            }
        }

        let max_requests = parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 100u32)?;
        let window_secs = parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 60u64)?;
        let enable_headers = parse_or(&lookup, "RATE_LIMIT_HEADERS", true)?;

        if max_requests == 0 || window_secs == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_REQUESTS and RATE_LIMIT_WINDOW_SECS must be positive");
        }

        let log_format = parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?;
        let seed_users = lookup("MEMORY_SEED_USERS")
            .map(|raw| parse_seed_users(&raw))
            .unwrap_or_default();

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
            },
            identity_backend,
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            redis: RedisConfig { url: redis_url },
            auth: AuthConfig {
                methods,
                query_param,
                short_circuit,
            },
            rate_limit: RateLimitConfig {
                max_requests,
                window_secs,
                enable_headers,
            },
            logging: LoggingConfig { format: log_format },
            seed_users,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Authentication policy described by `auth`
    pub fn composite_auth(&self) -> CompositeAuth {
        let methods = self
            .auth
            .methods
            .iter()
            .filter_map(|name| AuthMethod::from_name(name, &self.auth.query_param))
            .collect();

        CompositeAuth::new(methods).with_short_circuit(self.auth.short_circuit)
    }

    /// Application-wide quota
    pub fn default_rate_limit(&self) -> RateLimit {
        RateLimit::new(self.rate_limit.max_requests, self.rate_limit.window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use userapi_shared::auth::composite::AuthMethodKind;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/users")]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.api.cors_origins, vec!["*"]);
        assert_eq!(config.identity_backend, IdentityBackend::Postgres);
        assert_eq!(config.database.max_connections, 10);
        assert!(config.redis.url.is_none());
        assert_eq!(config.auth.query_param, "access-token");
        assert!(!config.auth.short_circuit);
        assert_eq!(config.default_rate_limit(), RateLimit::new(100, 60));
        assert!(config.rate_limit.enable_headers);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.seed_users.is_empty());
    }

    #[test]
    fn test_default_auth_order() {
        let config = load(&[("IDENTITY_BACKEND", "memory")]).unwrap();
        let kinds: Vec<_> = config.composite_auth().methods().iter().map(AuthMethod::kind).collect();

        assert_eq!(
            kinds,
            vec![AuthMethodKind::Basic, AuthMethodKind::Bearer, AuthMethodKind::QueryParam]
        );
    }

    #[test]
    fn test_custom_auth_methods() {
        let config = load(&[
            ("IDENTITY_BACKEND", "memory"),
            ("AUTH_METHODS", "bearer, query"),
            ("AUTH_QUERY_PARAM", "token"),
            ("AUTH_SHORT_CIRCUIT", "true"),
        ])
        .unwrap();

        let auth = config.composite_auth();
        assert_eq!(auth.methods(), &[AuthMethod::Bearer, AuthMethod::query_param("token")]);
        assert!(auth.short_circuit());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        assert!(load(&[("IDENTITY_BACKEND", "memory")]).is_ok());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(load(&[("IDENTITY_BACKEND", "memory"), ("API_PORT", "http")]).is_err());
        assert!(load(&[("IDENTITY_BACKEND", "ldap")]).is_err());
        assert!(load(&[("IDENTITY_BACKEND", "memory"), ("AUTH_METHODS", "basic,digest")]).is_err());
        assert!(load(&[("IDENTITY_BACKEND", "memory"), ("AUTH_METHODS", " , ")]).is_err());
        assert!(load(&[("IDENTITY_BACKEND", "memory"), ("RATE_LIMIT_MAX_REQUESTS", "0")]).is_err());
        assert!(load(&[("IDENTITY_BACKEND", "memory"), ("RATE_LIMIT_HEADERS", "maybe")]).is_err());
        assert!(load(&[("IDENTITY_BACKEND", "memory"), ("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_log_format() {
        let config = load(&[("IDENTITY_BACKEND", "memory"), ("LOG_FORMAT", "JSON")]).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_seed_users() {
        let config = load(&[
            ("IDENTITY_BACKEND", "memory"),
            ("MEMORY_SEED_USERS", "alice:wonderland, bob:pa:ss,:nobody,broken"),
        ])
        .unwrap();

        let names: Vec<_> = config.seed_users.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(config.seed_users[1].password, "pa:ss");
        assert!(!format!("{:?}", config.seed_users[0]).contains("wonderland"));
    }

    #[test]
    fn test_cors_origins_list() {
        let config = load(&[
            ("IDENTITY_BACKEND", "memory"),
            ("CORS_ORIGINS", "https://a.example.com, https://b.example.com"),
        ])
        .unwrap();

        assert_eq!(
            config.api.cors_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }
}
