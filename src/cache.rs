//! Bounded in-memory cache with per-entry expiry.
//!
//! Each domain (search results, single books, trending aggregates, dashboard
//! payloads) owns its own [`TtlCache`] so eviction pressure in one cannot
//! starve another. When full, the entry inserted earliest is evicted; reads do
//! not refresh an entry's position.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

struct Store<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion sequence -> key, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Store<V> {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

pub struct TtlCache<V> {
    name: String,
    max_size: usize,
    default_ttl: Duration,
    store: Mutex<Store<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: impl Into<String>, max_size: usize, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            max_size,
            default_ttl,
            store: Mutex::new(Store {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    // A poisoned lock only means another caller panicked mid-operation; the
    // map itself is still structurally valid.
    fn lock(&self) -> MutexGuard<'_, Store<V>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite `key` with an explicit TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if self.max_size == 0 {
            return;
        }

        let key = key.into();
        let now = Instant::now();
        let mut store = self.lock();

        if let Some(entry) = store.entries.get_mut(&key) {
            entry.value = value;
            entry.stored_at = now;
            entry.ttl = ttl;
            return;
        }

        if store.entries.len() >= self.max_size {
            if let Some(evicted) = store.evict_oldest() {
                tracing::debug!(cache = %self.name, key = %evicted, "Evicted oldest cache entry");
            }
        }

        let seq = store.next_seq;
        store.next_seq += 1;
        store.order.insert(seq, key.clone());
        store.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
                seq,
            },
        );
    }

    /// Insert using the cache's default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Fetch a live entry. An expired entry is removed by the read.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut store = self.lock();

        match store.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }

        store.remove(key);
        None
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.order.clear();
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut store = self.lock();

        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Build a namespaced key: `prefix:param1:param2`.
pub fn cache_key<I, P>(prefix: &str, params: I) -> String
where
    I: IntoIterator<Item = P>,
    P: Display,
{
    let mut key = prefix.to_string();
    for param in params {
        key.push(':');
        key.push_str(&param.to_string());
    }
    key
}
