//! In-process caches shared by every request handler.
//!
//! - [`Cache`]: a reader/writer-locked key-value store with explicit invalidation only. Entries
//!   never expire; whoever mutates the underlying rows is responsible for calling
//!   [`Cache::del`] or [`Cache::flush`].
//! - [`LoginThrottle`]: per-client-address backoff applied at the start of every login attempt.
//!
//! Neither structure holds its lock across an `.await`. Database calls happen strictly outside
//! the critical sections, which only contain the map mutation itself.

pub mod throttle;

pub use throttle::LoginThrottle;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

/// A concurrent key-value store without expiry.
///
/// Reads take the shared side of the lock so concurrent `get`s never block each other; `set`,
/// `del` and `flush` take the exclusive side. Values are cloned out on `get`, so cache large
/// values behind an `Arc`.
///
/// A panicking writer cannot leave the map half-updated (every write is a single `HashMap`
/// operation), so a poisoned lock is recovered rather than propagated.
#[derive(Debug)]
pub struct Cache<K, V> {
    items: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or unconditionally overwrite `key`.
    pub fn set(&self, key: K, value: V) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(key, value);
    }

    /// Look up `key`, returning a clone of the cached value.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    /// Remove one entry. Returns whether it existed.
    pub fn del<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.remove(key).is_some()
    }

    /// Replace the backing store with an empty one.
    pub fn flush(&self) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        *items = HashMap::new();
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_get_overwrite() {
        let cache: Cache<String, u32> = Cache::new();
        assert_eq!(cache.get("a"), None);

        cache.set("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(1));

        cache.set("a".to_string(), 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_del_reports_existence() {
        let cache: Cache<String, u32> = Cache::new();
        cache.set("a".to_string(), 1);

        assert!(cache.del("a"));
        assert!(!cache.del("a"));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let cache: Cache<u32, &'static str> = Cache::new();
        cache.set(1, "one");
        cache.set(2, "two");

        cache.flush();
        assert!(cache.is_empty());

        // Flushing an already-empty store is a no-op
        cache.flush();
        assert!(cache.is_empty());

        cache.set(3, "three");
        assert_eq!(cache.get(&3), Some("three"));
    }

    #[test]
    fn test_concurrent_access() {
        let cache: Arc<Cache<u32, u32>> = Arc::new(Cache::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let key = i % 50;
                        cache.set(key, t);
                        let _ = cache.get(&key);
                        if i % 97 == 0 {
                            cache.del(&key);
                        }
                        if i % 251 == 0 {
                            cache.flush();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 50);
        for key in 0..50 {
            if let Some(value) = cache.get(&key) {
                assert!(value < 8);
            }
        }
    }
}
