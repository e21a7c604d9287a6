//! Memoization layer for extracted text and token counts

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

/// Approximate heap footprint of a cached value, used for the byte budget
pub trait Weigh {
    fn weight(&self) -> usize;
}

impl Weigh for String {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl Weigh for usize {
    fn weight(&self) -> usize {
        std::mem::size_of::<usize>()
    }
}

struct CacheInner<V> {
    lru: LruCache<String, V>,
    total_bytes: usize,
}

/// Bounded LRU cache with entry count and byte budget limits.
///
/// Shared across concurrent tool calls; every operation takes the inner lock.
pub struct MemoCache<V> {
    inner: Mutex<CacheInner<V>>,
    max_bytes: usize,
}

fn entry_bytes<V: Weigh>(key: &str, value: &V) -> usize {
    key.len() + value.weight()
}

impl<V: Weigh + Clone> MemoCache<V> {
    /// Create a new cache with the specified entry capacity and byte budget
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store a value.
    /// Rejects entries larger than max_bytes entirely.
    /// Evicts LRU entries until the byte budget is satisfied.
    pub fn put(&self, key: String, value: V) {
        let new_size = entry_bytes(&key, &value);

        if new_size > self.max_bytes {
            return;
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry_bytes(&key, &old));
        }

        while inner.total_bytes + new_size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((evicted_key, evicted_val)) => {
                    inner.total_bytes = inner
                        .total_bytes
                        .saturating_sub(entry_bytes(&evicted_key, &evicted_val));
                }
                None => break,
            }
        }

        // Capacity eviction inside LruCache::push also has to release its bytes
        if let Some((evicted_key, evicted_val)) = inner.lru.push(key, value) {
            inner.total_bytes = inner
                .total_bytes
                .saturating_sub(entry_bytes(&evicted_key, &evicted_val));
        }
        inner.total_bytes += new_size;
    }

    /// Get a value, marking it as most recently used
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().lru.get(key).cloned()
    }

    #[cfg(test)]
    /// Check if a key exists in the cache
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    #[cfg(test)]
    /// Remove an entry from the cache
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let val = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(entry_bytes(key, &val));
        Some(val)
    }

    #[cfg(test)]
    /// Clear all entries from the cache
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    #[cfg(test)]
    /// Get total bytes currently accounted to cached entries
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }
}

/// Content key for a byte sequence: lower-case hex SHA-256
pub fn content_key(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic_operations() {
        let cache: MemoCache<String> = MemoCache::new(10, 1024 * 1024);

        assert!(cache.is_empty());

        cache.put("k1".to_string(), "abc".to_string());
        assert!(!cache.is_empty());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 5);

        assert_eq!(cache.get("k1").as_deref(), Some("abc"));
        assert!(cache.contains("k1"));
        assert!(!cache.contains("k2"));
    }

    #[test]
    fn test_cache_entry_capacity_eviction() {
        let cache: MemoCache<String> = MemoCache::new(2, 1024 * 1024);

        cache.put("k1".to_string(), "a".to_string());
        cache.put("k2".to_string(), "b".to_string());
        cache.put("k3".to_string(), "c".to_string());

        // k1 is least recently used
        assert!(!cache.contains("k1"));
        assert!(cache.contains("k2"));
        assert!(cache.contains("k3"));
        assert_eq!(cache.total_bytes(), 6);
    }

    #[test]
    fn test_cache_get_refreshes_recency() {
        let cache: MemoCache<String> = MemoCache::new(2, 1024);

        cache.put("k1".to_string(), "a".to_string());
        cache.put("k2".to_string(), "b".to_string());
        let _ = cache.get("k1");
        cache.put("k3".to_string(), "c".to_string());

        assert!(cache.contains("k1"));
        assert!(!cache.contains("k2"));
    }

    #[test]
    fn test_cache_byte_budget_eviction() {
        // 2-byte keys + 28-byte values = 30 bytes per entry
        let cache: MemoCache<String> = MemoCache::new(10, 100);

        cache.put("k1".to_string(), "x".repeat(28));
        cache.put("k2".to_string(), "x".repeat(28));
        cache.put("k3".to_string(), "x".repeat(28));
        assert_eq!(cache.total_bytes(), 90);

        cache.put("k4".to_string(), "x".repeat(28));
        assert!(!cache.contains("k1"));
        assert!(cache.contains("k2"));
        assert!(cache.contains("k3"));
        assert!(cache.contains("k4"));
        assert_eq!(cache.total_bytes(), 90);
    }

    #[test]
    fn test_cache_oversized_entry_rejected() {
        let cache: MemoCache<String> = MemoCache::new(10, 50);

        cache.put("huge".to_string(), "x".repeat(100));
        assert!(!cache.contains("huge"));
        assert_eq!(cache.total_bytes(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_byte_tracking_update() {
        let cache: MemoCache<String> = MemoCache::new(10, 1024);

        cache.put("k1".to_string(), "x".repeat(50));
        assert_eq!(cache.total_bytes(), 52);

        cache.put("k1".to_string(), "x".repeat(30));
        assert_eq!(cache.total_bytes(), 32);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_remove_and_clear() {
        let cache: MemoCache<usize> = MemoCache::new(10, 1024);

        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.remove("a"), Some(1));
        assert!(!cache.contains("a"));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_content_key_is_stable_sha256() {
        assert_eq!(
            content_key(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_key(b"%PDF-1.4"), content_key(b"%PDF-1.4"));
        assert_ne!(content_key(b"%PDF-1.4"), content_key(b"%PDF-1.5"));
    }
}
