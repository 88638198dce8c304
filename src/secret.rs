use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// The minimum length of a secret that passes the strength policy.
pub const MIN_SECRET_LENGTH: usize = 8;

/// The shared secret a token is signed with.
///
/// The bytes are wiped from memory when the secret is dropped and are never printed.
#[derive(Clone)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    /// Construct a new secret from raw bytes.
    pub fn new<T: Into<Vec<u8>>>(bytes: T) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Get the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The length of this secret, in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check this secret against the strength policy.
    ///
    /// A strong secret is at least [`MIN_SECRET_LENGTH`] bytes long and contains at least one ASCII
    /// digit and one ASCII letter.
    pub fn check_strength(&self) -> Result<(), WeakSecretError> {
        if self.0.len() < MIN_SECRET_LENGTH {
            return Err(WeakSecretError::TooShort(MIN_SECRET_LENGTH));
        }
        if !self.0.iter().any(u8::is_ascii_digit) {
            return Err(WeakSecretError::MissingDigit);
        }
        if !self.0.iter().any(u8::is_ascii_alphabetic) {
            return Err(WeakSecretError::MissingLetter);
        }
        Ok(())
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} bytes])", self.0.len())
    }
}

impl From<Vec<u8>> for Secret {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Secret {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for Secret {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes())
    }
}

impl From<String> for Secret {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

/// A secret that does not meet the strength policy.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum WeakSecretError {
    #[error("secret must be at least {0} bytes long")]
    TooShort(usize),

    #[error("secret must include at least one number")]
    MissingDigit,

    #[error("secret must include at least one letter")]
    MissingLetter,
}
