/// Process-local allowance store
///
/// Buckets live in a `HashMap` behind a single mutex. `consume` holds the
/// lock for the whole refill-and-spend step and never awaits while holding
/// it, so the hold time is a few map operations.
///
/// Counters are lost on restart and not shared between processes; use
/// [`super::redis_store::RedisAllowanceStore`] when more than one API
/// instance serves traffic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Allowance, AllowanceStore, RateLimit, RateLimitDecision};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryAllowanceStore {
    buckets: Mutex<HashMap<String, Allowance>>,
}

impl MemoryAllowanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Allowance>>, StoreError> {
        self.buckets
            .lock()
            .map_err(|_| StoreError::Unavailable("allowance lock poisoned".to_string()))
    }
}

#[async_trait]
impl AllowanceStore for MemoryAllowanceStore {
    async fn load_allowance(&self, key: &str) -> Result<Option<Allowance>, StoreError> {
        Ok(self.lock()?.get(key).copied())
    }

    async fn save_allowance(&self, key: &str, allowance: Allowance, _limit: RateLimit) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), allowance);
        Ok(())
    }

    async fn consume(&self, key: &str, limit: RateLimit, now: i64) -> Result<RateLimitDecision, StoreError> {
        let mut buckets = self.lock()?;
        let (decision, next) = Allowance::consume(buckets.get(key).copied(), limit, now);
        buckets.insert(key.to_string(), next);
        Ok(decision)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
