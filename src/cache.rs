//! Fixed-capacity LRU cache whose entries also expire a fixed time after insertion.
//!
//! Everything stored here can be fetched again from the metadata provider,
//! so losing an entry only costs an extra request.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// Default time-to-live for metadata entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe bounded cache with least-recently-used eviction and a TTL.
///
/// `get` and `add` both count as a use for eviction order. An entry older
/// than the TTL is treated as absent even when capacity was never exceeded,
/// and it is dropped the first time a `get` finds it expired.
///
/// Time is read from `tokio::time::Instant`, which follows the paused clock
/// in tests.
pub struct TtlCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock();
        let expired = match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            cache.pop(key);
        }
        None
    }

    /// Inserts or replaces `key`, restarting its TTL.
    pub fn add(&self, key: K, value: V) {
        self.inner.lock().put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
