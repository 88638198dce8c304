use super::{DataKey, DataKeyRequest, DecryptRequest, EncryptionContext, KeyManagementService, KmsError};
use crate::secret::Secret;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use std::{collections::HashMap, fmt};
use zeroize::Zeroizing;

const NONCE_LENGTH: usize = 12;
const MASTER_KEY_LENGTH: usize = 32;

/// A key management service that keeps its master keys in process memory.
///
/// Data keys are sealed with AES-256-GCM under the master key for their alias, using the
/// encryption context as additional authenticated data. A ciphertext blob is laid out as:
///
/// ```text
/// alias length (1 byte) | alias | nonce (12 bytes) | sealed data key
/// ```
///
/// Master keys never leave this instance, so ciphertexts can only be decrypted by the instance
/// that generated them.
pub struct LocalKms {
    region: String,
    master_keys: RwLock<HashMap<String, Aes256Gcm>>,
}

impl LocalKms {
    /// Construct a KMS for the given region, with no master keys.
    pub fn new<T: Into<String>>(region: T) -> Self {
        Self { region: region.into(), master_keys: Default::default() }
    }

    /// Create a random master key under the given alias.
    ///
    /// An existing master key for the alias is replaced, which makes every data key generated
    /// under it undecryptable.
    pub fn create_key(&self, alias: &str) -> Result<(), LocalKmsError> {
        if alias.is_empty() || alias.len() > usize::from(u8::MAX) {
            return Err(LocalKmsError::InvalidAlias(alias.to_string()));
        }
        let mut key = Zeroizing::new([0u8; MASTER_KEY_LENGTH]);
        OsRng.fill_bytes(&mut key[..]);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        self.master_keys.write().insert(alias.to_string(), cipher);
        Ok(())
    }

    /// Create a master key under the given alias.
    pub fn with_key(self, alias: &str) -> Result<Self, LocalKmsError> {
        self.create_key(alias)?;
        Ok(self)
    }

    /// The region this KMS serves.
    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Debug for LocalKms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let master_keys = self.master_keys.read();
        let aliases: Vec<_> = master_keys.keys().collect();
        f.debug_struct("LocalKms").field("region", &self.region).field("aliases", &aliases).finish()
    }
}

impl KeyManagementService for LocalKms {
    fn generate_data_key(&self, request: DataKeyRequest<'_>) -> Result<DataKey, KmsError> {
        let master_keys = self.master_keys.read();
        let cipher =
            master_keys.get(request.alias).ok_or_else(|| LocalKmsError::UnknownAlias(request.alias.to_string()))?;

        let mut plaintext = vec![0u8; request.key_spec.key_length()];
        OsRng.fill_bytes(&mut plaintext);
        let plaintext = Secret::new(plaintext);

        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        let aad = context_aad(request.context)?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext.as_bytes(), aad: &aad })
            .map_err(|_| LocalKmsError::Encryption)?;

        let alias = request.alias.as_bytes();
        let mut ciphertext = Vec::with_capacity(1 + alias.len() + NONCE_LENGTH + sealed.len());
        // Aliases are at most 255 bytes long, which is enforced when creating keys.
        ciphertext.push(alias.len() as u8);
        ciphertext.extend_from_slice(alias);
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&sealed);
        Ok(DataKey { ciphertext, plaintext })
    }

    fn decrypt(&self, request: DecryptRequest<'_>) -> Result<Secret, KmsError> {
        if request.region != self.region {
            return Err(LocalKmsError::RegionMismatch { expected: self.region.clone(), actual: request.region.to_string() }
                .into());
        }
        let (alias, nonce, sealed) = split_ciphertext(request.ciphertext)?;
        let master_keys = self.master_keys.read();
        let cipher = master_keys.get(alias).ok_or_else(|| LocalKmsError::UnknownAlias(alias.to_string()))?;
        let aad = context_aad(request.context)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad: &aad })
            .map_err(|_| LocalKmsError::Decryption)?;
        Ok(Secret::new(plaintext))
    }
}

fn context_aad(context: &EncryptionContext) -> Result<Vec<u8>, LocalKmsError> {
    serde_json::to_vec(context).map_err(LocalKmsError::Context)
}

fn split_ciphertext(ciphertext: &[u8]) -> Result<(&str, &[u8], &[u8]), LocalKmsError> {
    let (&alias_length, rest) = ciphertext.split_first().ok_or(LocalKmsError::MalformedCiphertext)?;
    let alias_length = usize::from(alias_length);
    if rest.len() < alias_length + NONCE_LENGTH {
        return Err(LocalKmsError::MalformedCiphertext);
    }
    let (alias, rest) = rest.split_at(alias_length);
    let (nonce, sealed) = rest.split_at(NONCE_LENGTH);
    let alias = std::str::from_utf8(alias).map_err(|_| LocalKmsError::MalformedCiphertext)?;
    Ok((alias, nonce, sealed))
}

/// An error raised by [`LocalKms`].
#[derive(Debug, thiserror::Error)]
pub enum LocalKmsError {
    #[error("invalid key alias: {0:?}")]
    InvalidAlias(String),

    #[error("no master key for alias {0:?}")]
    UnknownAlias(String),

    #[error("ciphertext belongs to region {actual:?}, this KMS serves {expected:?}")]
    RegionMismatch { expected: String, actual: String },

    #[error("malformed ciphertext blob")]
    MalformedCiphertext,

    #[error("invalid encryption context: {0}")]
    Context(serde_json::Error),

    #[error("data key encryption failed")]
    Encryption,

    #[error("data key decryption failed")]
    Decryption,
}
