use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{CacheEntry, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

/// Store persisted as a single JSON document, written through on every
/// mutation. Survives process restarts; TTLs are absolute instants.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl FileCacheStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => serde_json::from_slice::<HashMap<String, CacheEntry>>(&bytes).map_err(
                |e| CacheError::Corrupt {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                },
            )?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("opened cache file {} with {} entries", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(e) if e.is_expired(now) => {
                let mut next = entries.clone();
                next.remove(key);
                self.persist(&next).await?;
                *entries = next;
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
        let entry = CacheEntry::new(value, ttl, self.clock.now());
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), entry);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(key) {
            let mut next = entries.clone();
            next.remove(key);
            self.persist(&next).await?;
            *entries = next;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        let next = HashMap::new();
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get_value(key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStoreExt;
    use crate::clock::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let store = FileCacheStore::open(&path).await.unwrap();
            store.set("guepex:wilayas", &json!([{"id": 16}]), None).await.unwrap();
        }
        let store = FileCacheStore::open(&path).await.unwrap();
        let v: Option<Value> = store.get("guepex:wilayas").await.unwrap();
        assert_eq!(v, Some(json!([{"id": 16}])));
    }

    #[tokio::test]
    async fn expired_eviction_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let clock = Arc::new(ManualClock::default());
        let store = FileCacheStore::open_with_clock(&path, clock.clone()).await.unwrap();
        store.set("k", &1, Some(Duration::from_secs(5))).await.unwrap();
        clock.advance(Duration::from_secs(6));
        assert!(!store.has("k").await.unwrap());

        let reopened = FileCacheStore::open_with_clock(&path, clock).await.unwrap();
        assert!(reopened.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = FileCacheStore::open(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let clock = Arc::new(ManualClock::default());
        let store = FileCacheStore::open_with_clock(sub.join("cache.json"), clock.clone())
            .await
            .unwrap();
        store.set("k", &1, Some(Duration::from_secs(5))).await.unwrap();

        // Replace the cache directory with a plain file so every write fails.
        std::fs::remove_dir_all(&sub).unwrap();
        std::fs::write(&sub, b"").unwrap();

        clock.advance(Duration::from_secs(6));
        assert!(store.get_value("k").await.is_err());
        assert!(store.entries.lock().await.contains_key("k"));

        assert!(store.set_value("b", Value::Bool(true), None).await.is_err());
        assert!(!store.entries.lock().await.contains_key("b"));

        assert!(store.clear().await.is_err());
        assert_eq!(store.entries.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path().join("c.json")).await.unwrap();
        store.set("a", &1, None).await.unwrap();
        store.set("b", &2, None).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(!store.has("a").await.unwrap());
        assert!(store.has("b").await.unwrap());
        store.clear().await.unwrap();
        assert!(!store.has("b").await.unwrap());
    }
}
