/// Redis-backed allowance store
///
/// Buckets are Redis hashes under `ratelimit:{identity key}` with fields
/// `remaining` (float, as string) and `timestamp` (Unix seconds). Keys
/// expire after two windows of inactivity; an expired bucket is a full one.
///
/// `consume` runs a Lua script so that the read, refill, decrement and write
/// happen inside Redis as a single atomic step. Any number of API processes
/// can share one Redis without over-granting.
///
/// # Example
///
/// ```no_run
/// use userapi_shared::ratelimit::{redis_store::RedisAllowanceStore, AllowanceStore, RateLimit};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisAllowanceStore::connect("redis://localhost:6379").await?;
/// let decision = store.consume("user:1", RateLimit::default(), 1_700_000_000).await?;
/// println!("allowed: {}", decision.allowed);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::sync::Arc;
use tracing::{error, info};

use super::{Allowance, AllowanceStore, RateLimit, RateLimitDecision};
use crate::error::StoreError;

/// Prefix for every bucket key
pub const KEY_PREFIX: &str = "ratelimit:";

const CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'remaining', 'timestamp')
local remaining = tonumber(bucket[1])
local timestamp = tonumber(bucket[2])

if not remaining or not timestamp then
    remaining = capacity
    timestamp = now
end

local elapsed = math.max(now - timestamp, 0)
remaining = math.min(capacity, remaining + (elapsed * capacity / window))

local allowed = 0
if remaining >= 1 then
    allowed = 1
    remaining = remaining - 1
end

redis.call('HSET', key, 'remaining', tostring(remaining), 'timestamp', now)
redis.call('EXPIRE', key, ttl)

return {allowed, tostring(remaining)}
"#;

#[derive(Clone)]
pub struct RedisAllowanceStore {
    manager: ConnectionManager,
    script: Arc<Script>,
}

impl RedisAllowanceStore {
    /// Opens a managed connection to `url`
    ///
    /// The connection manager reconnects on its own after transient
    /// failures.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            error!(error = %e, "Invalid Redis URL");
            StoreError::Redis(e)
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!(error = %e, "Failed to connect to Redis");
            StoreError::Redis(e)
        })?;

        info!("Connected to Redis allowance store");
        Ok(Self::new(manager))
    }

    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            script: Arc::new(Script::new(CONSUME_SCRIPT)),
        }
    }
}

fn bucket_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Idle buckets outlive a full window so a slow client keeps its state
fn ttl_secs(limit: RateLimit) -> u64 {
    limit.window_secs.max(1) * 2
}

#[async_trait]
impl AllowanceStore for RedisAllowanceStore {
    async fn load_allowance(&self, key: &str) -> Result<Option<Allowance>, StoreError> {
        let mut conn = self.manager.clone();

        let (remaining, timestamp): (Option<f64>, Option<i64>) = redis::cmd("HMGET")
            .arg(bucket_key(key))
            .arg("remaining")
            .arg("timestamp")
            .query_async(&mut conn)
            .await?;

        Ok(match (remaining, timestamp) {
            (Some(remaining), Some(timestamp)) => Some(Allowance { remaining, timestamp }),
            _ => None,
        })
    }

    async fn save_allowance(&self, key: &str, allowance: Allowance, limit: RateLimit) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let key = bucket_key(key);

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("remaining")
            .arg(allowance.remaining.to_string())
            .arg("timestamp")
            .arg(allowance.timestamp)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(limit))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn consume(&self, key: &str, limit: RateLimit, now: i64) -> Result<RateLimitDecision, StoreError> {
        let mut conn = self.manager.clone();

        let (allowed, remaining): (i64, String) = self
            .script
            .key(bucket_key(key))
            .arg(limit.max_requests)
            .arg(limit.window_secs.max(1))
            .arg(now)
            .arg(ttl_secs(limit))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Rate limit script failed");
                StoreError::Redis(e)
            })?;

        let remaining = remaining
            .parse::<f64>()
            .map_err(|_| StoreError::Unavailable(format!("Unreadable bucket level: {}", remaining)))?;

        Ok(RateLimitDecision::from_remaining(allowed == 1, remaining, limit))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
