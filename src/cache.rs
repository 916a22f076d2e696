//! TTL cache for request responses.
//!
//! Eviction is lazy: an entry read after its expiry is removed and reported as a miss.
//! There is no background sweep, so callers keep their key space bounded (method + path,
//! never anything random). `cache_or_fetch` does not coalesce in-flight producers: two
//! callers missing the same key at the same time both run their producer and the last
//! write wins.

use std::collections::HashMap as StdHashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub expiry: Instant,
}

/// Hit/miss counters; lets callers observe that a cached path skipped the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct RequestCache<T> {
    map: RwLock<StdHashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T: Clone> RequestCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            map: RwLock::new(StdHashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration { self.default_ttl }

    /// Live value under `key`. An expired entry is evicted and reads as absent.
    pub fn get(&self, key: &str) -> Option<T> {
        {
            let r = self.map.read();
            match r.get(key) {
                Some(ent) if Instant::now() < ent.expiry => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(ent.data.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
        // expired: re-check under the write lock, a concurrent set may have refreshed it
        let mut w = self.map.write();
        if let Some(ent) = w.get(key) {
            if Instant::now() < ent.expiry {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(ent.data.clone());
            }
            w.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: impl Into<String>, data: T, ttl: Option<Duration>) {
        let expiry = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.map.write().insert(key.into(), CacheEntry { data, expiry });
    }

    pub fn remove(&self, key: &str) -> bool { self.map.write().remove(key).is_some() }

    pub fn clear(&self) { self.map.write().clear(); }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|k, _| !k.starts_with(prefix));
        before - w.len()
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Return the live value for `key`, or run `producer` and store its successful result.
    /// Errors are returned unchanged and never cached.
    pub async fn cache_or_fetch<F, Fut, E>(&self, key: &str, producer: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        let data = producer().await?;
        self.set(key, data.clone(), ttl);
        Ok(data)
    }
}
