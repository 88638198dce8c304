//! Resolution of the secrets tokens are signed with.
//!
//! A [`SecretProvider`] hands out the secret used to sign a token being issued and recovers the
//! secret needed to check a parsed token. Providers can either hold a fixed secret
//! ([`StaticSecret`]) or provision one from a key management service
//! ([`KmsSecretProvider`]).

mod kms;

pub use kms::{CacheKey, InvalidCacheKeyError, KmsConfig, KmsSecretProvider};

use crate::{
    cache::CacheError,
    header::Header,
    kms::KmsError,
    secret::{Secret, WeakSecretError},
};
use chrono::{DateTime, Utc};

/// Resolves the secrets tokens are signed with.
pub trait SecretProvider: Send + Sync {
    /// Get the secret to sign a new token with.
    ///
    /// Providers may attach the metadata needed to recover the secret later to the header.
    fn issuance_secret(&self, header: &mut Header, now: DateTime<Utc>) -> Result<Secret, SecretResolutionError>;

    /// Get the secret a token with the given header was signed with.
    fn validation_secret(&self, header: &Header) -> Result<Secret, SecretResolutionError>;
}

/// A provider that always uses the same caller supplied secret.
#[derive(Clone, Debug)]
pub struct StaticSecret {
    secret: Secret,
}

impl StaticSecret {
    /// Construct a provider for a secret without checking its strength.
    pub fn new<T: Into<Secret>>(secret: T) -> Self {
        Self { secret: secret.into() }
    }

    /// Construct a provider for a secret, making sure it meets the strength policy first.
    pub fn checked<T: Into<Secret>>(secret: T) -> Result<Self, WeakSecretError> {
        let secret = secret.into();
        secret.check_strength()?;
        Ok(Self { secret })
    }
}

impl SecretProvider for StaticSecret {
    fn issuance_secret(&self, _header: &mut Header, _now: DateTime<Utc>) -> Result<Secret, SecretResolutionError> {
        Ok(self.secret.clone())
    }

    fn validation_secret(&self, _header: &Header) -> Result<Secret, SecretResolutionError> {
        Ok(self.secret.clone())
    }
}

/// An error when resolving a signing secret.
#[derive(Debug, thiserror::Error)]
pub enum SecretResolutionError {
    #[error("KMS request failed: {0}")]
    Kms(#[source] KmsError),

    #[error("cache access failed: {0}")]
    Cache(#[from] CacheError),

    #[error("token header has no KMS descriptor")]
    MissingDescriptor,

    #[error("invalid data key ciphertext: {0}")]
    Ciphertext(#[from] base64::DecodeError),

    #[error("corrupt cache entry {0:?}")]
    CorruptCacheEntry(String),

    #[error("cache entry encoding failed: {0}")]
    Encoding(serde_json::Error),

    #[error("KMS returned an empty data key")]
    EmptyDataKey,
}
