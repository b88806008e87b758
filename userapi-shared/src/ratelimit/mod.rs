/// Per-identity rate limiting
///
/// Each identity owns one token bucket. The bucket holds at most
/// `max_requests` tokens and refills continuously at
/// `max_requests / window_secs` tokens per second. Every request spends one
/// token; an empty bucket rejects the request.
///
/// # State
///
/// An [`Allowance`] is the pair `(remaining, timestamp)`: tokens left after
/// the last check and the Unix second that check happened. A missing
/// allowance is a full bucket.
///
/// # Atomicity
///
/// [`AllowanceStore::consume`] performs load, refill, decrement and save as
/// one step per key. Concurrent requests from the same identity can never
/// spend the same token twice. [`AllowanceStore::load_allowance`] and
/// [`AllowanceStore::save_allowance`] exist for inspection and
/// administration and are not used on the request path.
///
/// # Stores
///
/// - [`redis_store::RedisAllowanceStore`]: shared across processes, Lua script
/// - [`memory::MemoryAllowanceStore`]: single process, mutex-guarded map
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use userapi_shared::ratelimit::{memory::MemoryAllowanceStore, RateLimit, RateLimiter};
///
/// # async fn example(user: userapi_shared::models::user::User) -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RateLimiter::new(Arc::new(MemoryAllowanceStore::new()), RateLimit::new(100, 60));
///
/// let decision = limiter.check(&user, "view", 1_700_000_000).await?;
/// assert!(decision.allowed);
/// assert_eq!(decision.remaining, 99);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StoreError;

/// Quota: `max_requests` per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimit {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// Tokens regained per second
    pub fn refill_rate(&self) -> f64 {
        self.max_requests as f64 / self.window_secs.max(1) as f64
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit::new(100, 60)
    }
}

/// Capability of identities that can be rate limited
pub trait RateLimitable {
    /// Key the identity's bucket is stored under
    fn rate_limit_key(&self) -> String;

    /// Quota for `action`; `default` is the application-wide policy
    fn rate_limit(&self, action: &str, default: RateLimit) -> RateLimit;
}

/// Persisted bucket state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allowance {
    /// Tokens left after the last check
    pub remaining: f64,

    /// Unix seconds of the last check
    pub timestamp: i64,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Bucket capacity
    pub limit: u32,

    /// Whole tokens left after this request
    pub remaining: u32,

    /// Seconds until the bucket is full again
    pub reset_after: u64,

    /// Seconds until the next token (0 when allowed)
    pub retry_after: u64,
}

impl RateLimitDecision {
    /// Builds the decision from the bucket level left after the check
    pub fn from_remaining(allowed: bool, remaining: f64, limit: RateLimit) -> Self {
        let capacity = limit.max_requests as f64;
        let window = limit.window_secs.max(1) as f64;

        // Seconds needed to regain `tokens`
        let seconds_for = |tokens: f64| (tokens * window / capacity.max(1.0)).ceil().max(0.0) as u64;

        RateLimitDecision {
            allowed,
            limit: limit.max_requests,
            remaining: remaining.floor().max(0.0) as u32,
            reset_after: seconds_for(capacity - remaining),
            retry_after: if allowed {
                0
            } else {
                seconds_for(1.0 - remaining).max(1)
            },
        }
    }
}

impl Allowance {
    /// A full bucket as of `now`
    pub fn full(limit: RateLimit, now: i64) -> Self {
        Allowance {
            remaining: limit.max_requests as f64,
            timestamp: now,
        }
    }

    /// Refills, then tries to spend one token
    ///
    /// Returns the decision and the state to persist. Time running backwards
    /// (clock skew between nodes) refills nothing.
    pub fn consume(state: Option<Allowance>, limit: RateLimit, now: i64) -> (RateLimitDecision, Allowance) {
        let capacity = limit.max_requests as f64;
        let window = limit.window_secs.max(1) as f64;
        let current = state.unwrap_or_else(|| Allowance::full(limit, now));

        let elapsed = now.saturating_sub(current.timestamp).max(0) as f64;
        let mut remaining = (current.remaining + elapsed * capacity / window).min(capacity);

        let allowed = remaining >= 1.0;
        if allowed {
            remaining -= 1.0;
        }

        let decision = RateLimitDecision::from_remaining(allowed, remaining, limit);

        (
            decision,
            Allowance {
                remaining,
                timestamp: now,
            },
        )
    }
}

/// Durable storage for bucket state, keyed per identity
#[async_trait]
pub trait AllowanceStore: Send + Sync {
    /// Reads the stored allowance, `None` if the identity has no bucket yet
    async fn load_allowance(&self, key: &str) -> Result<Option<Allowance>, StoreError>;

    /// Overwrites the stored allowance
    async fn save_allowance(&self, key: &str, allowance: Allowance, limit: RateLimit) -> Result<(), StoreError>;

    /// Atomically refills and spends one token for `key`
    async fn consume(&self, key: &str, limit: RateLimit, now: i64) -> Result<RateLimitDecision, StoreError>;

    /// Checks the backing service is reachable
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Applies the quota policy of an identity against an allowance store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn AllowanceStore>,
    default_limit: RateLimit,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AllowanceStore>, default_limit: RateLimit) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    pub fn default_limit(&self) -> RateLimit {
        self.default_limit
    }

    pub fn store(&self) -> &Arc<dyn AllowanceStore> {
        &self.store
    }

    /// Checks and records one request by `identity` for `action` at `now`
    ///
    /// # Errors
    ///
    /// Store failures are returned as-is. They never turn into an allowed
    /// request.
    pub async fn check<I>(&self, identity: &I, action: &str, now: i64) -> Result<RateLimitDecision, StoreError>
    where
        I: RateLimitable + ?Sized,
    {
        let limit = identity.rate_limit(action, self.default_limit);
        let key = identity.rate_limit_key();

        let decision = self.store.consume(&key, limit, now).await?;

        if !decision.allowed {
            tracing::debug!(key = %key, action, limit = limit.max_requests, "Rate limit exceeded");
        }

        Ok(decision)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_default_limit() {
        let limit = RateLimit::default();
        assert_eq!(limit.max_requests, 100);
        assert_eq!(limit.window_secs, 60);
        assert!((limit.refill_rate() - 100.0 / 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_window_does_not_divide_by_zero() {
        let limit = RateLimit::new(10, 0);
        assert_eq!(limit.refill_rate(), 10.0);
    }

    #[test]
    fn test_missing_state_is_full_bucket() {
        let (decision, state) = Allowance::consume(None, RateLimit::new(10, 60), NOW);

        assert!(decision.allowed);
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.retry_after, 0);
        assert_eq!(state.remaining, 9.0);
        assert_eq!(state.timestamp, NOW);
    }

    #[test]
    fn test_empty_bucket_rejects() {
        let limit = RateLimit::new(10, 60);
        let empty = Allowance {
            remaining: 0.0,
            timestamp: NOW,
        };

        let (decision, state) = Allowance::consume(Some(empty), limit, NOW);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        // 1 token at 1/6 token per second
        assert_eq!(decision.retry_after, 6);
        assert_eq!(decision.reset_after, 60);
        assert_eq!(state.remaining, 0.0);
    }

    #[test]
    fn test_refill_proportional_to_elapsed() {
        let limit = RateLimit::new(60, 60);
        let state = Allowance {
            remaining: 5.0,
            timestamp: NOW - 10,
        };

        let (decision, next) = Allowance::consume(Some(state), limit, NOW);
        assert!(decision.allowed);
        // 5 + 10 refilled - 1 spent
        assert_eq!(next.remaining, 14.0);
        assert_eq!(decision.remaining, 14);
        assert_eq!(decision.reset_after, 46);
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let limit = RateLimit::new(100, 60);
        let state = Allowance {
            remaining: 95.0,
            timestamp: NOW - 3600,
        };

        let (_, next) = Allowance::consume(Some(state), limit, NOW);
        assert_eq!(next.remaining, 99.0);
    }

    #[test]
    fn test_clock_skew_refills_nothing() {
        let limit = RateLimit::new(100, 60);
        let state = Allowance {
            remaining: 3.0,
            timestamp: NOW + 30,
        };

        let (decision, next) = Allowance::consume(Some(state), limit, NOW);
        assert!(decision.allowed);
        assert_eq!(next.remaining, 2.0);
    }

    #[test]
    fn test_hundred_then_reject_then_refill() {
        let limit = RateLimit::new(100, 60);
        let mut state = None;

        for i in 0..100 {
            let (decision, next) = Allowance::consume(state, limit, NOW);
            assert!(decision.allowed, "request {} should pass", i + 1);
            state = Some(next);
        }

        let (decision, exhausted) = Allowance::consume(state, limit, NOW);
        assert!(!decision.allowed, "request 101 should be rejected");
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, 1);

        // One second regains 1.67 tokens
        let (decision, _) = Allowance::consume(Some(exhausted), limit, NOW + 1);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);

        let (decision, _) = Allowance::consume(Some(exhausted), limit, NOW + 60);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 99);
    }
}
