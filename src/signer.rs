use crate::secret::Secret;
use hmac::{Hmac, Mac};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::Sha256;
use std::{fmt, str::FromStr};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A token signing algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum Algorithm {
    /// HMAC using SHA-256.
    #[default]
    Hs256,
}

impl Algorithm {
    /// The name of this algorithm as it appears in the `alg` header.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
        }
    }

    /// Get the signer that implements this algorithm.
    pub fn signer(&self) -> &'static dyn Signer {
        match self {
            Self::Hs256 => &HmacSha256Signer,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Algorithm {
    type Err = UnsupportedAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" | "sha256" => Ok(Self::Hs256),
            _ => Err(UnsupportedAlgorithmError(s.to_string())),
        }
    }
}

/// An algorithm identifier that is not supported.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("unsupported algorithm: {0}")]
pub struct UnsupportedAlgorithmError(pub String);

/// Computes and checks token signatures.
pub trait Signer: Send + Sync {
    /// The algorithm this signer implements.
    fn algorithm(&self) -> Algorithm;

    /// Sign a message using the given secret.
    fn sign(&self, message: &[u8], secret: &Secret) -> Result<Vec<u8>, SigningError>;

    /// Check that a signature is valid for a message.
    ///
    /// The comparison runs in constant time with respect to the contents of the signature.
    fn verify(&self, message: &[u8], secret: &Secret, signature: &[u8]) -> Result<bool, SigningError> {
        let expected = self.sign(message, secret)?;
        Ok(expected.as_slice().ct_eq(signature).into())
    }
}

/// An error that can occur when signing a token.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// A signer that uses HMAC-SHA256.
#[derive(Clone, Copy, Debug, Default)]
pub struct HmacSha256Signer;

impl Signer for HmacSha256Signer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Hs256
    }

    fn sign(&self, message: &[u8], secret: &Secret) -> Result<Vec<u8>, SigningError> {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
