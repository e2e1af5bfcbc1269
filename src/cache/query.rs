use super::{CacheBackend, InMemoryCache};
use crate::errors::ServiceError;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-typed read-through cache over a [`CacheBackend`].
///
/// Cache failures never fail the caller: a broken entry is treated as a miss and a failed
/// write is only logged.
#[derive(Clone)]
pub struct QueryCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCache::new()), ttl)
    }

    pub async fn get_or_load<T, F, Fut>(&self, key: &str, loader: F) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key, "Cache miss"),
            Err(e) => warn!(key, error = %e, "Cache read failed"),
        }

        let value = loader().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.backend.set(key, &raw, Some(self.ttl)).await {
                    warn!(key, error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to encode value for cache"),
        }

        Ok(value)
    }

    /// Drops every cached entry under `prefix` (e.g. `"batches:"`)
    pub async fn invalidate(&self, prefix: &str) {
        match self.backend.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix, removed, "Cache invalidated"),
            Err(e) => warn!(prefix, error = %e, "Cache invalidation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loader_runs_once_until_invalidated() {
        let cache = QueryCache::in_memory(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let names: Vec<String> = cache
                .get_or_load("batches:all", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["Line A".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(names, vec!["Line A".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate("batches:").await;
        let _: Vec<String> = cache
            .get_or_load("batches:all", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let cache = QueryCache::in_memory(Duration::from_secs(60));
        let first: Result<u32, ServiceError> = cache
            .get_or_load("k", || async { Err(ServiceError::NotFound("k".into())) })
            .await;
        assert!(first.is_err());

        let second: u32 = cache.get_or_load("k", || async { Ok(7) }).await.unwrap();
        assert_eq!(second, 7);
    }
}
