//! In-process caches: a generic TTL cache and the capped embedding cache.
//!
//! Both are shared per process and accessed under a single writer lock
//! with short critical sections.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// A thread-safe cache with time-to-live expiration.
///
/// Entries are considered expired after the configured TTL but are not
/// removed until `cleanup_expired()` is called.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, TtlEntry<V>>>,
    ttl: Duration,
}

struct TtlEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Create a new cache with the specified TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Insert a value, replacing any existing entry and resetting the TTL.
    pub async fn insert(&self, key: K, value: V) {
        let entry = TtlEntry {
            value,
            inserted_at: Instant::now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Insert a value with an explicit timestamp (tests only).
    #[cfg(test)]
    pub async fn insert_at(&self, key: K, value: V, inserted_at: Instant) {
        let entry = TtlEntry { value, inserted_at };
        self.entries.write().await.insert(key, entry);
    }

    /// Get a value if it exists and hasn't expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().await;
        guard.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Remove all expired entries and return the count removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut guard = self.entries.write().await;
        let before_count = guard.len();
        guard.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before_count - guard.len()
    }

    /// Current number of entries (including expired ones not yet cleaned).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Default capacity of the in-memory embedding cache.
pub const EMBEDDING_CACHE_CAPACITY: usize = 10_000;
/// Embedding entries live for 7 days.
pub const EMBEDDING_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// Share of entries dropped (least-hit first) when capacity is reached.
const EVICTION_FRACTION: f64 = 0.2;

struct EmbeddingEntry {
    vector: Vec<f32>,
    hits: u64,
    inserted_at: Instant,
}

/// Capped in-memory embedding cache keyed by content hash.
///
/// On overflow the least-hit 20% of entries are dropped. A persistent
/// cache behind this one absorbs the misses.
pub struct EmbeddingMemoryCache {
    entries: RwLock<HashMap<String, EmbeddingEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl EmbeddingMemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub async fn get(&self, text_hash: &str) -> Option<Vec<f32>> {
        let mut guard = self.entries.write().await;
        let entry = guard.get_mut(text_hash)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            guard.remove(text_hash);
            return None;
        }
        entry.hits += 1;
        Some(entry.vector.clone())
    }

    pub async fn insert(&self, text_hash: String, vector: Vec<f32>) {
        let mut guard = self.entries.write().await;
        if guard.len() >= self.capacity && !guard.contains_key(&text_hash) {
            Self::evict_least_hit(&mut guard);
        }
        guard.insert(
            text_hash,
            EmbeddingEntry {
                vector,
                hits: 0,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn evict_least_hit(entries: &mut HashMap<String, EmbeddingEntry>) {
        let to_drop = ((entries.len() as f64 * EVICTION_FRACTION).ceil() as usize).max(1);
        let mut by_hits: Vec<(String, u64)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.hits))
            .collect();
        by_hits.sort_by_key(|(_, hits)| *hits);
        for (key, _) in by_hits.into_iter().take(to_drop) {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ttl_insert_and_get() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("key".to_string(), 42).await;
        assert_eq!(cache.get(&"key".to_string()).await, Some(42));
    }

    #[tokio::test]
    async fn ttl_expired_entries_not_returned() {
        let ttl = Duration::from_millis(10);
        let cache: TtlCache<String, i32> = TtlCache::new(ttl);
        let expired_at = Instant::now() - (ttl + Duration::from_millis(1));
        cache.insert_at("key".to_string(), 42, expired_at).await;

        assert_eq!(cache.get(&"key".to_string()).await, None);
    }

    #[tokio::test]
    async fn ttl_cleanup_removes_expired() {
        let ttl = Duration::from_millis(10);
        let cache: TtlCache<String, i32> = TtlCache::new(ttl);
        let expired_at = Instant::now() - (ttl + Duration::from_millis(1));
        cache.insert_at("key1".to_string(), 1, expired_at).await;
        cache.insert("key2".to_string(), 2).await;

        assert_eq!(cache.cleanup_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn embedding_cache_round_trip() {
        let cache = EmbeddingMemoryCache::new(10, Duration::from_secs(60));
        cache.insert("h1".to_string(), vec![1.0, 2.0]).await;
        assert_eq!(cache.get("h1").await, Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("h2").await, None);
    }

    #[tokio::test]
    async fn embedding_cache_evicts_least_hit() {
        let cache = EmbeddingMemoryCache::new(5, Duration::from_secs(60));
        for i in 0..5 {
            cache.insert(format!("h{i}"), vec![i as f32]).await;
        }
        // Touch everything except h0 so it becomes the eviction victim.
        for i in 1..5 {
            cache.get(&format!("h{i}")).await;
        }
        cache.insert("h5".to_string(), vec![5.0]).await;

        assert_eq!(cache.get("h0").await, None, "least-hit entry evicted");
        assert!(cache.get("h5").await.is_some());
    }

    #[tokio::test]
    async fn embedding_cache_reinsert_does_not_evict() {
        let cache = EmbeddingMemoryCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), vec![1.0]).await;
        cache.insert("b".to_string(), vec![2.0]).await;
        // Overwriting an existing key must not push anything out.
        cache.insert("b".to_string(), vec![3.0]).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, Some(vec![1.0]));
    }
}
