//! Bounded cache with TTL and max-size eviction
//!
//! Remembers which deposit indices the relayer has already handled without
//! growing without bound over long runtimes.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Bounded set of keys with TTL and capacity limits.
///
/// On insert at capacity, expired entries are evicted first, then the oldest
/// remaining entry by insertion time.
pub struct BoundedCache<K> {
    /// Key -> insertion timestamp
    map: HashMap<K, Instant>,
    max_size: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone> BoundedCache<K> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// Returns true if the key is present and not expired.
    pub fn contains(&self, key: &K) -> bool {
        self.map.get(key).is_some_and(|&t| t.elapsed() < self.ttl)
    }

    /// Insert a key. Evicts expired, then oldest entries if at capacity.
    pub fn insert(&mut self, key: K) {
        let now = Instant::now();

        self.map
            .retain(|_, &mut t| now.duration_since(t) < self.ttl);

        while self.map.len() >= self.max_size {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, t)| **t)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    self.map.remove(&k);
                }
                None => break,
            }
        }

        self.map.insert(key, now);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
