use super::{CacheError, CacheStore};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use zeroize::Zeroizing;

struct Entry {
    value: Zeroizing<Vec<u8>>,
    // `None` when the TTL is too large to be represented.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// An in-process cache store.
///
/// Expired entries are never returned and are dropped the next time the store is written to.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live entries in this cache.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|entry| !entry.is_expired(now)).count()
    }

    /// Whether this cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read();
        let value = entries.get(key).filter(|entry| !entry.is_expired(Instant::now())).map(|entry| entry.value.to_vec());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl);
        let mut entries = self.entries.write();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(key.to_string(), Entry { value: Zeroizing::new(value.to_vec()), expires_at });
        Ok(())
    }
}
