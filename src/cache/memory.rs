use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{CacheEntry, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct Inner {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Inner {
    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }
}

/// In-process store. A background task purges expired entries every
/// [`SWEEP_INTERVAL`]; reads evict lazily in between.
#[derive(Debug)]
pub struct MemoryCacheStore {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    every: Duration,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_sweep_interval(clock, SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(clock: Arc<dyn Clock>, every: Duration) -> Self {
        let inner = Arc::new(Inner {
            entries: Mutex::new(HashMap::new()),
            clock,
        });
        let sweeper = spawn_sweeper(Arc::downgrade(&inner), every);
        Self {
            inner,
            sweeper: Mutex::new(sweeper),
            every,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    // A store reused after `destroy` gets its sweep back on the next write.
    fn ensure_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = spawn_sweeper(Arc::downgrade(&self.inner), self.every);
        }
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryCacheStore {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

fn spawn_sweeper(inner: Weak<Inner>, every: Duration) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime; memory cache sweep disabled, expiry stays lazy");
        return None;
    };
    Some(handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            let purged = inner.purge_expired();
            if purged > 0 {
                debug!("memory cache sweep purged {} entries", purged);
            }
        }
    }))
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(e) if e.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(e) => Ok(Some(e.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.ensure_sweeper();
        let entry = CacheEntry::new(value, ttl, self.inner.clock.now());
        self.inner.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.entries.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.entries.lock().clear();
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get_value(key).await?.is_some())
    }

    async fn destroy(&self) {
        self.stop_sweeper();
        self.inner.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStoreExt;
    use crate::clock::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn ttl_entry_expires_after_deadline() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryCacheStore::with_clock(clock.clone());
        store
            .set("yalidine:wilayas", &json!([1, 2]), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        let v: Option<Value> = store.get("yalidine:wilayas").await.unwrap();
        assert_eq!(v, Some(json!([1, 2])));

        clock.advance(Duration::from_secs(31));
        assert!(!store.has("yalidine:wilayas").await.unwrap());
        assert!(store.is_empty(), "expired entry is physically removed on read");
    }

    #[tokio::test]
    async fn entries_without_ttl_persist() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryCacheStore::with_clock(clock.clone());
        store.set("k", &"v", None).await.unwrap();
        for _ in 0..5 {
            clock.advance(Duration::from_secs(86_400 * 365));
            let v: Option<String> = store.get("k").await.unwrap();
            assert_eq!(v.as_deref(), Some("v"));
        }
    }

    #[tokio::test]
    async fn purge_drops_only_expired_entries() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryCacheStore::with_clock(clock.clone());
        store.set("short", &1, Some(Duration::from_secs(1))).await.unwrap();
        store.set("long", &2, Some(Duration::from_secs(100))).await.unwrap();
        store.set("forever", &3, None).await.unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_purges_unread_entries() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryCacheStore::with_sweep_interval(clock.clone(), Duration::from_secs(60));
        store.set("k", &1, Some(Duration::from_secs(10))).await.unwrap();
        clock.advance(Duration::from_secs(11));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn destroy_stops_sweep_and_empties_store() {
        let store = MemoryCacheStore::new();
        store.set("k", &1, None).await.unwrap();
        assert!(store.is_sweeping());
        store.destroy().await;
        store.destroy().await;
        assert!(!store.is_sweeping());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn write_after_destroy_restarts_sweep() {
        let store = MemoryCacheStore::new();
        store.destroy().await;
        assert!(!store.is_sweeping());
        store.set("k", &1, Some(Duration::from_secs(5))).await.unwrap();
        assert!(store.is_sweeping());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn outside_runtime_falls_back_to_lazy_expiry() {
        let store = MemoryCacheStore::new();
        assert!(!store.is_sweeping());
    }
}
