use super::{SecretProvider, SecretResolutionError};
use crate::{
    cache::CacheStore,
    codec,
    header::{Header, KmsDescriptor},
    kms::{DataKey, DataKeyRequest, DecryptRequest, EncryptionContext, KeyManagementService, KeySpec},
    secret::Secret,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as, DurationSeconds};
use sha2::{Digest, Sha256};
use std::{fmt, mem, sync::Arc, time::Duration};
use zeroize::{Zeroize, Zeroizing};

const DEFAULT_REGION: &str = "us-west-2";
const DEFAULT_VERSION: &str = "2014-11-01";
const DEFAULT_ALIAS: &str = "jwt-signing";
const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const MAX_CACHE_KEY_LENGTH: usize = 128;
const VALIDATION_CACHE_PREFIX: &str = "kms-dk-";

/// The configuration for a [`KmsSecretProvider`].
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    /// The region to request data keys from.
    pub region: String,

    /// The KMS API version recorded in issued tokens.
    pub version: String,

    /// The alias of the master key to generate data keys under.
    pub alias: String,

    /// The encryption context to bind data keys to.
    pub context: EncryptionContext,

    /// How often issuers switch to a new data key, in seconds. `None` or zero disables rotation.
    #[serde(default = "default_rotation_interval")]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub rotation_interval: Option<Duration>,

    /// How long data keys are cached for, in seconds.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cache_ttl: Duration,
}

fn default_rotation_interval() -> Option<Duration> {
    Some(DEFAULT_ROTATION_INTERVAL)
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            version: DEFAULT_VERSION.to_string(),
            alias: DEFAULT_ALIAS.to_string(),
            context: EncryptionContext::new(),
            rotation_interval: Some(DEFAULT_ROTATION_INTERVAL),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// A key under which issuers share a data key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    /// Construct a cache key.
    ///
    /// Keys must be non empty and only contain ASCII letters, digits, `-` and `_`.
    pub fn new<T: Into<String>>(key: T) -> Result<Self, InvalidCacheKeyError> {
        let key = key.into();
        let valid = !key.is_empty()
            && key.len() <= MAX_CACHE_KEY_LENGTH
            && key.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_');
        if valid {
            Ok(Self(key))
        } else {
            Err(InvalidCacheKeyError(key))
        }
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cache key with invalid characters.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("invalid cache key: {0:?}")]
pub struct InvalidCacheKeyError(pub String);

// The data key pair issuers share through the cache.
#[serde_as]
#[derive(Serialize, Deserialize)]
struct CachedDataKey {
    #[serde_as(as = "Base64")]
    ciphertext: Vec<u8>,

    #[serde_as(as = "Base64")]
    plaintext: Vec<u8>,
}

impl Drop for CachedDataKey {
    fn drop(&mut self) {
        self.plaintext.zeroize();
    }
}

/// A provider that signs tokens with data keys generated by a key management service.
///
/// Issued tokens carry the encrypted data key in their header so that validators can ask the
/// KMS to decrypt it. Both sides keep data keys in a cache:
///
/// * Issuers reuse a data key for as long as it sits in the cache under the configured cache
///   key. With rotation enabled the cache key is suffixed with the current rotation period so a
///   new data key is generated once per period.
/// * Validators cache decrypted data keys under a digest of their ciphertext and encryption
///   context.
pub struct KmsSecretProvider {
    kms: Arc<dyn KeyManagementService>,
    cache: Arc<dyn CacheStore>,
    config: KmsConfig,
    cache_key: Option<CacheKey>,
}

impl KmsSecretProvider {
    /// Construct a new provider.
    ///
    /// Issuers only reuse data keys once a cache key is set using [`Self::with_cache_key`].
    pub fn new(kms: Arc<dyn KeyManagementService>, cache: Arc<dyn CacheStore>, config: KmsConfig) -> Self {
        Self { kms, cache, config, cache_key: None }
    }

    /// Set the key issuers share data keys under.
    pub fn with_cache_key(mut self, key: &str) -> Result<Self, InvalidCacheKeyError> {
        self.cache_key = Some(CacheKey::new(key)?);
        Ok(self)
    }

    /// The configuration for this provider.
    pub fn config(&self) -> &KmsConfig {
        &self.config
    }

    // Providers sharing a cache and a cache key only share data keys when they would generate
    // them under the same master key and context.
    fn key_scope(&self) -> String {
        let mut hasher = Sha256::new();
        let fields = [&self.config.region, &self.config.version, &self.config.alias]
            .into_iter()
            .chain(self.config.context.iter().flat_map(|(name, value)| [name, value]));
        for field in fields {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(&hasher.finalize()[..8])
    }

    fn issuance_cache_key(&self, now: DateTime<Utc>) -> Option<String> {
        let key = self.cache_key.as_ref()?;
        let scope = self.key_scope();
        let interval = self.config.rotation_interval.map(|interval| interval.as_secs()).unwrap_or_default();
        if interval == 0 {
            return Some(format!("{key}-{scope}"));
        }
        let period = now.timestamp().div_euclid(interval as i64);
        Some(format!("{key}-{scope}-{period}"))
    }

    fn descriptor(&self, ciphertext: &[u8]) -> KmsDescriptor {
        KmsDescriptor {
            region: self.config.region.clone(),
            version: self.config.version.clone(),
            alias: self.config.alias.clone(),
            context: self.config.context.clone(),
            key: codec::encode(ciphertext),
        }
    }

    fn generate_data_key(&self) -> Result<DataKey, SecretResolutionError> {
        let request =
            DataKeyRequest { alias: &self.config.alias, key_spec: KeySpec::Aes256, context: &self.config.context };
        let data_key = self.kms.generate_data_key(request).map_err(SecretResolutionError::Kms)?;
        if data_key.plaintext.is_empty() {
            return Err(SecretResolutionError::EmptyDataKey);
        }
        Ok(data_key)
    }

    fn load_data_key(&self, cache_key: &str) -> Result<Option<DataKey>, SecretResolutionError> {
        let Some(entry) = self.cache.get(cache_key)?.map(Zeroizing::new) else {
            return Ok(None);
        };
        let mut entry: CachedDataKey = serde_json::from_slice(&entry)
            .map_err(|_| SecretResolutionError::CorruptCacheEntry(cache_key.to_string()))?;
        if entry.plaintext.is_empty() {
            return Err(SecretResolutionError::CorruptCacheEntry(cache_key.to_string()));
        }
        let ciphertext = mem::take(&mut entry.ciphertext);
        let plaintext = Secret::new(mem::take(&mut entry.plaintext));
        Ok(Some(DataKey { ciphertext, plaintext }))
    }

    fn store_data_key(&self, cache_key: &str, data_key: &DataKey) -> Result<(), SecretResolutionError> {
        let entry =
            CachedDataKey { ciphertext: data_key.ciphertext.clone(), plaintext: data_key.plaintext.as_bytes().to_vec() };
        let entry = serde_json::to_vec(&entry).map(Zeroizing::new).map_err(SecretResolutionError::Encoding)?;
        self.cache.set(cache_key, &entry, self.config.cache_ttl)?;
        Ok(())
    }
}

impl SecretProvider for KmsSecretProvider {
    #[tracing::instrument(skip_all, fields(alias = %self.config.alias))]
    fn issuance_secret(&self, header: &mut Header, now: DateTime<Utc>) -> Result<Secret, SecretResolutionError> {
        let cache_key = self.issuance_cache_key(now);
        let data_key = match &cache_key {
            Some(cache_key) => match self.load_data_key(cache_key)? {
                Some(data_key) => {
                    tracing::debug!(cache = "issuance", key = %cache_key, "cache hit");
                    data_key
                }
                None => {
                    tracing::debug!(cache = "issuance", key = %cache_key, "cache miss");
                    let data_key = self.generate_data_key()?;
                    self.store_data_key(cache_key, &data_key)?;
                    data_key
                }
            },
            None => self.generate_data_key()?,
        };
        header.kms = Some(self.descriptor(&data_key.ciphertext));
        Ok(data_key.plaintext)
    }

    #[tracing::instrument(skip_all)]
    fn validation_secret(&self, header: &Header) -> Result<Secret, SecretResolutionError> {
        let descriptor = header.kms.as_ref().ok_or(SecretResolutionError::MissingDescriptor)?;
        let ciphertext = descriptor.ciphertext()?;
        let cache_key = validation_cache_key(&ciphertext, &descriptor.context)?;
        if let Some(plaintext) = self.cache.get(&cache_key)? {
            tracing::debug!(cache = "validation", key = %cache_key, "cache hit");
            let plaintext = Secret::new(plaintext);
            if plaintext.is_empty() {
                return Err(SecretResolutionError::CorruptCacheEntry(cache_key));
            }
            return Ok(plaintext);
        }

        tracing::debug!(cache = "validation", key = %cache_key, "cache miss");
        let request = DecryptRequest { region: &descriptor.region, ciphertext: &ciphertext, context: &descriptor.context };
        let plaintext = self.kms.decrypt(request).map_err(SecretResolutionError::Kms)?;
        if plaintext.is_empty() {
            return Err(SecretResolutionError::EmptyDataKey);
        }
        self.cache.set(&cache_key, plaintext.as_bytes(), self.config.cache_ttl)?;
        Ok(plaintext)
    }
}

impl fmt::Debug for KmsSecretProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsSecretProvider")
            .field("config", &self.config)
            .field("cache_key", &self.cache_key)
            .finish_non_exhaustive()
    }
}

// A data key can only be decrypted with the context it was bound to, so both take part in the key.
fn validation_cache_key(ciphertext: &[u8], context: &EncryptionContext) -> Result<String, SecretResolutionError> {
    let context = serde_json::to_vec(context).map_err(SecretResolutionError::Encoding)?;
    let digest = Sha256::new()
        .chain_update((ciphertext.len() as u64).to_be_bytes())
        .chain_update(ciphertext)
        .chain_update(context)
        .finalize();
    Ok(format!("{VALIDATION_CACHE_PREFIX}{}", hex::encode(digest)))
}
