mod file;
mod memory;

pub use file::FileCacheStore;
pub use memory::{MemoryCacheStore, SWEEP_INTERVAL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::CacheError;

/// A cached value and its optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// `ttl` of `None` or zero never expires.
    pub fn new(value: Value, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expires_at = ttl
            .filter(|d| !d.is_zero())
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| now.checked_add_signed(d));
        Self { value, expires_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Key/value store with TTL semantics. Expired entries read as absent and are
/// removed on that read.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    /// Release background resources. Stores without any keep the default.
    async fn destroy(&self) {}
}

/// Typed access on top of any [`CacheStore`].
#[async_trait]
pub trait CacheStoreExt: CacheStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_value(key).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let v = serde_json::to_value(value)?;
        self.set_value(key, v, ttl).await
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}

pub fn cache_key(agent: &str, resource: &str) -> String {
    format!("{}:{}", agent, resource)
}
