use crate::{codec, kms::EncryptionContext, signer::Algorithm};
use serde::{Deserialize, Serialize};

/// The default value of the `typ` header.
pub const DEFAULT_TOKEN_TYPE: &str = "JWT";

/// A token header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// The media type of the token.
    #[serde(default = "default_token_type")]
    pub typ: String,

    /// The algorithm the token is signed with.
    pub alg: Algorithm,

    /// A caller supplied key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// The encrypted data key the token was signed with, if it was provisioned by a KMS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms: Option<KmsDescriptor>,
}

impl Header {
    /// Construct a header for the given algorithm.
    pub fn new(alg: Algorithm) -> Self {
        Self { typ: DEFAULT_TOKEN_TYPE.to_string(), alg, kid: None, kms: None }
    }
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// Describes the KMS data key a token was signed with.
///
/// Only the encrypted form of the data key travels in the token. Anyone holding KMS decrypt
/// permissions for it can recover the signing secret.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KmsDescriptor {
    /// The KMS region.
    pub region: String,

    /// The KMS API version.
    pub version: String,

    /// The alias of the master key the data key was generated under.
    pub alias: String,

    /// The encryption context bound to the ciphertext.
    #[serde(default)]
    pub context: EncryptionContext,

    /// The base64url encoded ciphertext blob.
    pub key: String,
}

impl KmsDescriptor {
    /// Decode the ciphertext blob.
    pub fn ciphertext(&self) -> Result<Vec<u8>, base64::DecodeError> {
        codec::decode(&self.key)
    }
}
