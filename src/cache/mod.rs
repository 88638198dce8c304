//! Key/value stores used to keep data keys around between token operations.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use std::{io, path::PathBuf, time::Duration};

/// A key/value store with per entry expiration.
///
/// Stores may be shared between threads and processes. A write must replace an entry atomically
/// so that a concurrent reader sees either the previous value or the new one, never a mix.
pub trait CacheStore: Send + Sync {
    /// Get the value for a key, if it is present and not expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value under a key for the given amount of time.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Check whether a key is present and not expired.
    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some())
    }
}

/// An error when accessing a cache store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache entry {key:?}: {reason}")]
    Corrupt { key: String, reason: String },
}
