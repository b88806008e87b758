/// In-memory identity store
///
/// Keeps users in a `BTreeMap` keyed by id behind an `RwLock`. Ids are
/// assigned sequentially from 1. Username and access token uniqueness is
/// enforced the way the database's unique indexes would.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::IdentityStore;
use crate::auth::security::Security;
use crate::error::StoreError;
use crate::models::user::{CreateUser, Timestamps, User};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: RwLock<Inner>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("identity store lock poisoned".to_string())
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_active<F>(&self, predicate: F) -> Result<Option<User>, StoreError>
    where
        F: Fn(&User) -> bool,
    {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .users
            .values()
            .find(|u| u.is_active() && predicate(u))
            .cloned())
    }

    fn check_unique(inner: &Inner, user: &User) -> Result<(), StoreError> {
        for other in inner.users.values().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(StoreError::Conflict("username already taken".to_string()));
            }
            if other.access_token == user.access_token {
                return Err(StoreError::Conflict("access token already in use".to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.find_active(|u| u.id == id)
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.find_active(|u| u.access_token == token)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_active(|u| u.username == username)
    }

    async fn find_active_by_password_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.find_active(|u| u.password_reset_token.as_deref() == Some(token))
    }

    async fn create(&self, data: CreateUser, security: &Security) -> Result<User, StoreError> {
        // Hash outside the lock
        let mut user = User::build(data, security).await?;
        user.before_insert(Utc::now());

        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.next_id += 1;
        user.id = inner.next_id;
        Self::check_unique(&inner, &user)?;

        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &mut User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.users.contains_key(&user.id) {
            return Err(StoreError::UserMissing(user.id));
        }
        Self::check_unique(&inner, user)?;

        user.before_update(Utc::now());
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .users
            .values()
            .filter(|u| u.is_active())
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_active(&self) -> Result<i64, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.users.values().filter(|u| u.is_active()).count() as i64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.read().map(|_| ()).map_err(poisoned)
    }
}
