use super::{CacheError, CacheStore};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

const MAX_KEY_LENGTH: usize = 200;

#[serde_as]
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    expires_at: Option<DateTime<Utc>>,

    #[serde_as(as = "Base64")]
    value: Vec<u8>,
}

/// A cache store that keeps one file per entry in a directory.
///
/// Any number of processes on the same host can share a directory. Entries are written to a
/// temporary file next to their final location and then renamed over it, so readers never
/// observe a partially written entry.
#[derive(Clone, Debug)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    /// Construct a cache backed by the given directory, creating it if needed.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| CacheError::Io { path: directory.clone(), source })?;
        Ok(Self { directory })
    }

    /// The directory entries are stored in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key.len() <= MAX_KEY_LENGTH
            && key.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.directory.join(key))
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key)?;
        let contents = match fs::read(&path) {
            Ok(contents) => Zeroizing::new(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let entry: StoredEntry = serde_json::from_slice(&contents)
            .map_err(|e| CacheError::Corrupt { key: key.to_string(), reason: e.to_string() })?;
        if entry.expires_at.is_some_and(|expires_at| Utc::now() >= expires_at) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        let expires_at = TimeDelta::from_std(ttl).ok().and_then(|ttl| Utc::now().checked_add_signed(ttl));
        let entry = StoredEntry { expires_at, value: value.to_vec() };
        let contents = serde_json::to_vec(&entry)
            .map(Zeroizing::new)
            .map_err(|e| CacheError::Corrupt { key: key.to_string(), reason: e.to_string() })?;

        let io_error = |source| CacheError::Io { path: path.clone(), source };
        // The temporary file is created in the same directory so the rename stays atomic.
        let mut file = NamedTempFile::new_in(&self.directory).map_err(io_error)?;
        file.write_all(&contents).map_err(io_error)?;
        file.as_file().sync_all().map_err(io_error)?;
        file.persist(&path).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}
