//! The key management service a token's signing secret can be provisioned from.
//!
//! Tokens signed with a KMS data key only carry the encrypted form of that key. Issuers ask the
//! KMS for a fresh data key and validators ask it to decrypt the one embedded in the token.

mod local;

pub use local::{LocalKms, LocalKmsError};

use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Additional authenticated data bound to a data key's ciphertext.
///
/// Decrypting a ciphertext with a context other than the one it was generated with fails.
pub type EncryptionContext = BTreeMap<String, String>;

/// An opaque error raised by a key management service.
pub type KmsError = Box<dyn std::error::Error + Send + Sync>;

/// A key management service.
///
/// Calls may block on network I/O. Implementations are responsible for their own retries and
/// timeouts.
pub trait KeyManagementService: Send + Sync {
    /// Generate a new data key under a master key.
    fn generate_data_key(&self, request: DataKeyRequest<'_>) -> Result<DataKey, KmsError>;

    /// Decrypt a data key's ciphertext.
    fn decrypt(&self, request: DecryptRequest<'_>) -> Result<Secret, KmsError>;
}

/// A request to generate a data key.
#[derive(Clone, Copy, Debug)]
pub struct DataKeyRequest<'a> {
    /// The alias of the master key to generate the data key under.
    pub alias: &'a str,

    /// The kind of data key to generate.
    pub key_spec: KeySpec,

    /// The encryption context to bind to the ciphertext.
    pub context: &'a EncryptionContext,
}

/// A request to decrypt a data key.
#[derive(Clone, Copy, Debug)]
pub struct DecryptRequest<'a> {
    /// The region the data key was generated in.
    pub region: &'a str,

    /// The ciphertext blob.
    pub ciphertext: &'a [u8],

    /// The encryption context the ciphertext was bound to.
    pub context: &'a EncryptionContext,
}

/// A data key, both in encrypted and plaintext form.
#[derive(Clone, Debug)]
pub struct DataKey {
    /// The ciphertext blob, safe to embed in tokens.
    pub ciphertext: Vec<u8>,

    /// The plaintext key.
    pub plaintext: Secret,
}

/// The kind of data key to generate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySpec {
    /// A 256 bit symmetric key.
    #[default]
    #[serde(rename = "AES_256")]
    Aes256,
}

impl KeySpec {
    /// The length of keys of this kind, in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Self::Aes256 => 32,
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aes256 => write!(f, "AES_256"),
        }
    }
}
