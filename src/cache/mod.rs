// TTL key/value cache for reference lists read by every screen

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod query;

pub use query::QueryCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache lock poisoned")]
    Poisoned,
}

impl From<CacheError> for crate::errors::ServiceError {
    fn from(err: CacheError) -> Self {
        crate::errors::ServiceError::CacheError(err.to_string())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() >= expires_at,
            None => false,
        }
    }
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Process-local cache; expired entries are dropped lazily on read
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let store = self.store.read().map_err(|_| CacheError::Poisoned)?;
            match store.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut store = self.store.write().map_err(|_| CacheError::Poisoned)?;
        store.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(|_| CacheError::Poisoned)?;
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(|_| CacheError::Poisoned)?;
        store.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut store = self.store.write().map_err(|_| CacheError::Poisoned)?;
        let before = store.len();
        store.retain(|key, _| !key.starts_with(prefix));
        Ok(before - store.len())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(|_| CacheError::Poisoned)?;
        store.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("batches:list", "[]", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(cache.get("batches:list").await.unwrap().as_deref(), Some("[]"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("batches:list").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() {
        let cache = InMemoryCache::new();
        cache.set("designations:all", "a", None).await.unwrap();
        cache.set("designations:dept:1", "b", None).await.unwrap();
        cache.set("departments:all", "c", None).await.unwrap();

        assert_eq!(cache.delete_prefix("designations:").await.unwrap(), 2);
        assert_eq!(cache.get("departments:all").await.unwrap().as_deref(), Some("c"));
        assert_eq!(cache.len(), 1);
    }
}
