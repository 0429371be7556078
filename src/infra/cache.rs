//! Short-lived in-memory cache for carrier web-service responses.
//!
//! Entries expire after the configured lifetime. Concurrent writers for the
//! same key simply overwrite each other; the last one wins.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::sync::Mutex;

use crate::domain::DEFAULT_CACHE_LIFETIME;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Cached,
}

#[derive(Clone, Debug)]
pub struct CachedPayload<T> {
    pub data: T,
    pub fetched_at: SystemTime,
    pub status: CacheStatus,
}

struct Cached<T> {
    value: T,
    fetched_at: SystemTime,
}

impl<T: Clone> Cached<T> {
    fn if_fresh(&self, ttl: Duration) -> Option<CachedPayload<T>> {
        let fresh = self
            .fetched_at
            .elapsed()
            .map(|elapsed| elapsed <= ttl)
            .unwrap_or(false);
        fresh.then(|| CachedPayload {
            data: self.value.clone(),
            fetched_at: self.fetched_at,
            status: CacheStatus::Cached,
        })
    }
}

#[derive(Clone)]
pub struct ResponseCache<K, V> {
    entries: Arc<Mutex<HashMap<K, Cached<V>>>>,
    ttl: Duration,
}

impl<K, V> Default for ResponseCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_LIFETIME)
    }
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.lock().await.remove(key);
    }
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub async fn get(&self, key: &K) -> Option<CachedPayload<V>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|entry| entry.if_fresh(self.ttl))
    }

    pub async fn insert(&self, key: K, value: V) -> CachedPayload<V> {
        let fetched_at = SystemTime::now();
        let payload = CachedPayload {
            data: value.clone(),
            fetched_at,
            status: CacheStatus::Fresh,
        };
        if !self.ttl.is_zero() {
            self.entries
                .lock()
                .await
                .insert(key, Cached { value, fetched_at });
        }
        payload
    }

    /// Returns the cached value or runs `fetch` and stores its result.
    /// Errors are not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<CachedPayload<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(payload) = self.get(&key).await {
            return Ok(payload);
        }
        let value = fetch().await?;
        Ok(self.insert(key, value).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn serves_cached_value_within_lifetime() {
        let cache: ResponseCache<String, u32> = ResponseCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..3 {
            let payload = cache
                .get_or_fetch("token".to_string(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await
                .unwrap();
            assert_eq!(payload.data, 7);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.get(&"token".to_string()).await.map(|p| p.status),
            Some(CacheStatus::Cached)
        );
    }

    #[tokio::test]
    async fn zero_lifetime_disables_caching() {
        let cache: ResponseCache<&'static str, u32> = ResponseCache::new(Duration::ZERO);
        cache.insert("k", 1).await;
        assert!(cache.get(&"k").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let cache: ResponseCache<&'static str, u32> = ResponseCache::new(Duration::from_millis(20));
        cache.insert("k", 1).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&"k").await.is_none());
    }

    #[tokio::test]
    async fn last_writer_wins_and_errors_are_not_cached() {
        let cache: ResponseCache<&'static str, u32> = ResponseCache::default();
        cache.insert("k", 1).await;
        cache.insert("k", 2).await;
        assert_eq!(cache.get(&"k").await.map(|p| p.data), Some(2));

        let failed = cache
            .get_or_fetch("other", || async { Err::<u32, _>("down") })
            .await;
        assert!(failed.is_err());
        assert!(cache.get(&"other").await.is_none());
    }
}
