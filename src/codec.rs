use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde::{de::DeserializeOwned, Serialize};

/// The base64url engine used for every token segment.
///
/// Encoding never emits padding. Decoding accepts both padded and unpadded input, which is the
/// same as padding the input back to a multiple of 4 before decoding it.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode some bytes as unpadded base64url.
pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
    BASE64_URL.encode(input)
}

/// Decode base64url, with or without trailing padding.
pub fn decode<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_URL.decode(input)
}

/// Serialize a value as JSON and encode the resulting bytes.
pub fn encode_json<T: Serialize>(input: &T) -> Result<String, serde_json::Error> {
    let input = serde_json::to_vec(input)?;
    Ok(encode(input))
}

/// Decode a segment and parse the resulting bytes as JSON.
pub fn decode_json<T: DeserializeOwned>(input: &str) -> Result<T, JsonSegmentError> {
    let bytes = decode(input)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// An error when decoding a JSON segment.
#[derive(Debug, thiserror::Error)]
pub enum JsonSegmentError {
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
