//! Parsing and validation of issued tokens.

#[cfg(test)]
pub(crate) mod tests;

use crate::{
    claims::{self, Audience, ClaimSet},
    codec::{self, JsonSegmentError},
    error::TokenError,
    header::Header,
    provider::SecretProvider,
    time::{SystemClockTimeProvider, TimeProvider},
};
use serde::de::DeserializeOwned;
use std::{fmt, str::FromStr, sync::Arc};
use subtle::ConstantTimeEq;

/// The default maximum size of a serialized token, in bytes.
pub const DEFAULT_MAX_TOKEN_SIZE: usize = 1024 * 10;

/// Parameters used when decoding a token.
#[derive(Clone, Debug)]
pub struct DecodeParameters {
    /// The maximum size of a serialized token, in bytes.
    pub max_token_size: usize,
}

impl Default for DecodeParameters {
    fn default() -> Self {
        Self { max_token_size: DEFAULT_MAX_TOKEN_SIZE }
    }
}

/// The validation state of a parsed token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    /// The token was parsed but its signature and expiry have not been checked.
    Parsed,

    /// The token passed validation and its claims can be read.
    Validated,

    /// The token failed validation.
    Rejected(Rejection),
}

/// The reason a token was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The signature does not match the token's contents.
    InvalidSignature,

    /// The token's expiration time is in the past.
    Expired,
}

impl From<Rejection> for TokenError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::InvalidSignature => Self::SignatureVerificationFailed,
            Rejection::Expired => Self::TokenExpired,
        }
    }
}

// The segments of a token as they were received.
#[derive(Clone, Debug)]
struct RawToken {
    signing_input: String,
    signature: String,
}

/// A token parsed from its serialized form.
///
/// Only the header can be inspected until [`Token::validate`] succeeds, which allows picking a
/// [`SecretProvider`] based on it. Any attempt to read the claims before that fails with
/// [`TokenError::NotValidated`].
pub struct Token {
    raw: RawToken,
    header: Header,
    claims: ClaimSet,
    state: TokenState,
    time_provider: Arc<dyn TimeProvider>,
}

impl Token {
    /// Parse a token using the default decode parameters.
    pub fn init(token: &str) -> Result<Self, TokenError> {
        Self::init_with(token, &DecodeParameters::default())
    }

    /// Parse a token.
    pub fn init_with(token: &str, parameters: &DecodeParameters) -> Result<Self, TokenError> {
        if token.len() > parameters.max_token_size {
            return Err(ParseTokenError::TooLarge(parameters.max_token_size).into());
        }
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = segments.as_slice() else {
            return Err(ParseTokenError::SegmentCount(segments.len()).into());
        };

        let header: Header = decode_segment("header", header_b64)?;
        let claims: ClaimSet = decode_segment("claims", claims_b64)?;
        if claims.get(claims::EXPIRATION_TIME).is_some_and(|exp| !exp.is_null() && claims::numeric_date(exp).is_none()) {
            return Err(ParseTokenError::InvalidClaim(claims::EXPIRATION_TIME).into());
        }

        let raw =
            RawToken { signing_input: format!("{header_b64}.{claims_b64}"), signature: signature_b64.to_string() };
        Ok(Self { raw, header, claims, state: TokenState::Parsed, time_provider: Arc::new(SystemClockTimeProvider) })
    }

    /// Set the clock used to check this token's expiration time.
    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// The validation state of this token.
    pub fn state(&self) -> TokenState {
        self.state
    }

    /// Whether this token was successfully validated.
    pub fn is_validated(&self) -> bool {
        self.state == TokenState::Validated
    }

    /// The token's header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Whether this token was signed with a KMS data key.
    pub fn has_kms_header(&self) -> bool {
        self.header.kms.is_some()
    }

    /// Validate this token's signature and expiration time.
    ///
    /// Validating an already validated token checks it again. A rejected token stays rejected and
    /// reports the same error. If the secret cannot be resolved no verdict is reached and the
    /// token stays in the parsed state.
    pub fn validate<P: SecretProvider + ?Sized>(&mut self, provider: &P) -> Result<&ClaimSet, TokenError> {
        if let TokenState::Rejected(rejection) = self.state {
            return Err(rejection.into());
        }

        let secret = provider.validation_secret(&self.header)?;
        // Compare encoded forms so that any change to the stored segment, padding included, fails.
        let expected = self.header.alg.signer().sign(self.raw.signing_input.as_bytes(), &secret)?;
        let expected = codec::encode(expected);
        let verified: bool = expected.as_bytes().ct_eq(self.raw.signature.as_bytes()).into();
        if !verified {
            return Err(self.reject(Rejection::InvalidSignature));
        }

        let now = self.time_provider.current_time();
        if self.claims.expiration_timestamp().is_some_and(|exp| exp < now.timestamp()) {
            return Err(self.reject(Rejection::Expired));
        }

        self.state = TokenState::Validated;
        tracing::debug!(jti = self.claims.id().unwrap_or_default(), "token validated");
        Ok(&self.claims)
    }

    /// The token's claims.
    pub fn payload(&self) -> Result<&ClaimSet, TokenError> {
        match self.state {
            TokenState::Validated => Ok(&self.claims),
            _ => Err(TokenError::NotValidated),
        }
    }

    /// Consume this token and return its claims.
    pub fn into_payload(self) -> Result<ClaimSet, TokenError> {
        match self.state {
            TokenState::Validated => Ok(self.claims),
            _ => Err(TokenError::NotValidated),
        }
    }

    /// The token's issuer, if any.
    pub fn issuer(&self) -> Result<Option<&str>, TokenError> {
        Ok(self.payload()?.issuer())
    }

    /// The token's audience, if any.
    pub fn audience(&self) -> Result<Option<Audience>, TokenError> {
        Ok(self.payload()?.audience())
    }

    fn reject(&mut self, rejection: Rejection) -> TokenError {
        tracing::debug!(reason = ?rejection, "token rejected");
        self.state = TokenState::Rejected(rejection);
        rejection.into()
    }
}

impl FromStr for Token {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::init(s)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Claims are left out as they can't be trusted before validation.
        f.debug_struct("Token").field("header", &self.header).field("state", &self.state).finish_non_exhaustive()
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &'static str, input: &str) -> Result<T, ParseTokenError> {
    codec::decode_json(input).map_err(|e| match e {
        JsonSegmentError::Base64(e) => ParseTokenError::Base64(segment, e),
        JsonSegmentError::Json(e) => ParseTokenError::Json(segment, e),
    })
}

/// An error when parsing a token.
#[derive(Debug, thiserror::Error)]
pub enum ParseTokenError {
    #[error("token is larger than max allowed: {0} bytes")]
    TooLarge(usize),

    #[error("expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("invalid base64 found on {0}: {1}")]
    Base64(&'static str, base64::DecodeError),

    #[error("invalid JSON on {0}: {1}")]
    Json(&'static str, serde_json::Error),

    #[error("invalid {0} claim")]
    InvalidClaim(&'static str),
}
