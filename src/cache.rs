//! Bounded most-recently-used caches.
//!
//! [`MruCache`] is the plain container: an access counter stamps every hit and insert,
//! and the entry with the oldest stamp is evicted when a new key would exceed the
//! capacity. [`ActivationCache`] wraps one in a mutex and hands out `Arc` handles, so
//! eviction only drops the cache's reference and callers keep theirs.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::Error;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stamp: u64,
}

/// A fixed-capacity map evicting its least recently used entry.
#[derive(Debug)]
pub struct MruCache<K, V> {
    map: HashMap<K, Entry<V>>,
    capacity: usize,
    clock: u64,
}

impl<K, V> MruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        MruCache {
            map: HashMap::with_capacity(capacity),
            capacity,
            clock: 0,
        }
    }

    /// Look up and mark as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.clock += 1;
        let entry = self.map.get_mut(key)?;
        entry.stamp = self.clock;
        Some(&entry.value)
    }

    /// Insert as most recently used, returning the entry evicted to make room.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.clock += 1;
        let mut evicted = None;
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, e)| e.stamp)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                evicted = self.map.remove(&k).map(|e| (k, e.value));
            }
        }
        self.map.insert(
            key,
            Entry {
                value,
                stamp: self.clock,
            },
        );
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|e| e.value)
    }

    /// Keep only the entries for which `keep` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.map.retain(|k, e| keep(k, &e.value));
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.clock = 0;
    }

    /// Does not count as a use.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A thread-safe cache of built objects keyed by case-insensitive name.
#[derive(Debug)]
pub struct ActivationCache<V> {
    name: &'static str,
    inner: Mutex<MruCache<String, Arc<V>>>,
}

impl<V> ActivationCache<V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        ActivationCache {
            name,
            inner: Mutex::new(MruCache::new(capacity)),
        }
    }

    fn normalize(key: &str) -> String {
        key.to_ascii_uppercase()
    }

    /// Return the cached object for `key`, building and caching it on a miss.
    ///
    /// The builder runs without the lock held. If another thread cached the same key
    /// meanwhile, its object wins so every caller shares one instance. Failed builds
    /// are not cached.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Arc<V>, Error>
    where
        F: FnOnce() -> Result<V, Error>,
    {
        let key = Self::normalize(key);
        if let Some(hit) = self.inner.lock().get(&key) {
            trace!(cache = self.name, %key, "cache hit");
            return Ok(Arc::clone(hit));
        }
        debug!(cache = self.name, %key, "cache miss, building");
        let built = Arc::new(build()?);

        let mut inner = self.inner.lock();
        if let Some(raced) = inner.get(&key) {
            return Ok(Arc::clone(raced));
        }
        if let Some((old, _)) = inner.insert(key, Arc::clone(&built)) {
            debug!(cache = self.name, key = %old, "evicted least recently used entry");
        }
        Ok(built)
    }

    /// Cached object without building; counts as a use.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.lock().get(&Self::normalize(key)).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(&Self::normalize(key))
    }

    /// Drop one entry; returns whether it was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().remove(&Self::normalize(key)).is_some()
    }

    /// Drop every entry the predicate selects.
    pub fn invalidate_where(&self, mut drop: impl FnMut(&str, &V) -> bool) {
        self.inner.lock().retain(|k, v| !drop(k, v));
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}
