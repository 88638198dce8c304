use crate::{
    provider::{InvalidCacheKeyError, SecretResolutionError},
    secret::WeakSecretError,
    signer::{SigningError, UnsupportedAlgorithmError},
    token::ParseTokenError,
};

/// An error when issuing or validating a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(#[from] ParseTokenError),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("weak secret: {0}")]
    WeakSecret(#[from] WeakSecretError),

    #[error("invalid cache key: {0:?}")]
    InvalidCacheKey(String),

    #[error("could not resolve signing secret: {0}")]
    SecretResolution(#[from] SecretResolutionError),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("token expired")]
    TokenExpired,

    #[error("token has not been validated")]
    NotValidated,

    #[error("token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("expiration time is out of range")]
    ExpiryOutOfRange,
}

impl From<UnsupportedAlgorithmError> for TokenError {
    fn from(e: UnsupportedAlgorithmError) -> Self {
        Self::UnsupportedAlgorithm(e.0)
    }
}

impl From<InvalidCacheKeyError> for TokenError {
    fn from(e: InvalidCacheKeyError) -> Self {
        Self::InvalidCacheKey(e.0)
    }
}
