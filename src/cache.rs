// Bounded in-memory cache with per-entry TTL, owned by the collaborator
// that needs it rather than shared ambient state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Capacity-bounded TTL cache. When full, expired entries are evicted
/// first, then the oldest insertion.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    store: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        {
            let store = self.store.read().unwrap();
            match store.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but has expired; drop it under the write lock
        let mut store = self.store.write().unwrap();
        if store.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            store.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let mut store = self.store.write().unwrap();

        if !store.contains_key(&key) && store.len() >= self.capacity {
            store.retain(|_, entry| !entry.is_expired());
            if store.len() >= self.capacity {
                if let Some(oldest) = store
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone())
                {
                    store.remove(&oldest);
                }
            }
        }

        store.insert(key, CacheEntry::new(value, self.ttl));
    }

    pub fn invalidate(&self, key: &K) {
        let mut store = self.store.write().unwrap();
        store.remove(key);
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_inserted_value() {
        let cache: BoundedCache<&str, i64> = BoundedCache::new(4, Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn expired_entries_are_not_served() {
        let cache: BoundedCache<&str, i64> = BoundedCache::new(4, Duration::from_millis(0));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_insertion() {
        let cache: BoundedCache<&str, i64> = BoundedCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b", 2);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache: BoundedCache<&str, i64> = BoundedCache::new(4, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn reinserting_existing_key_does_not_evict() {
        let cache: BoundedCache<&str, i64> = BoundedCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }
}
