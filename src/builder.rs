use crate::{
    claims::{Audience, ClaimSet, JsonObject},
    codec,
    error::TokenError,
    header::{Header, DEFAULT_TOKEN_TYPE},
    provider::SecretProvider,
    signer::Algorithm,
    time::{SystemClockTimeProvider, TimeProvider},
};
use chrono::{DateTime, TimeDelta, Utc};
use std::{fmt, sync::Arc, time::Duration};

/// A token builder.
///
/// Every call to [`TokenBuilder::issue`] stamps the token with a fresh `jti`, sets `iat` to the
/// current time and, if an expiry offset was configured, sets `exp` relative to it.
#[derive(Clone)]
pub struct TokenBuilder {
    algorithm: Algorithm,
    token_type: String,
    key_id: Option<String>,
    claims: ClaimSet,
    expires_in: Option<Duration>,
    time_provider: Arc<dyn TimeProvider>,
}

impl TokenBuilder {
    /// Construct a new builder that signs tokens using HS256.
    pub fn new() -> Self {
        Self {
            algorithm: Algorithm::default(),
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            key_id: None,
            claims: ClaimSet::new(),
            expires_in: None,
            time_provider: Arc::new(SystemClockTimeProvider),
        }
    }

    /// Construct a new builder for the algorithm with the given name.
    ///
    /// Both `HS256` and the `sha256` digest name are accepted.
    pub fn with_algorithm(name: &str) -> Result<Self, TokenError> {
        let algorithm = name.parse::<Algorithm>()?;
        Ok(Self::new().algorithm(algorithm))
    }

    /// Set the signing algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the `typ` header.
    pub fn token_type<T: Into<String>>(mut self, token_type: T) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Set the `kid` header.
    pub fn key_id<T: Into<String>>(mut self, key_id: T) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Set the issuer.
    pub fn issuer<T: Into<String>>(mut self, issuer: T) -> Self {
        self.claims.set_issuer(issuer);
        self
    }

    /// Set the subject.
    pub fn subject<T: Into<String>>(mut self, subject: T) -> Self {
        self.claims.set_subject(subject);
        self
    }

    /// Set the audience.
    pub fn audience<T: Into<Audience>>(mut self, audience: T) -> Self {
        self.claims.set_audience(audience);
        self
    }

    /// Merge a set of custom claims into the payload.
    ///
    /// `iat` and `jti` are always overwritten at issuance.
    pub fn payload(mut self, payload: JsonObject) -> Self {
        self.claims.merge(payload);
        self
    }

    /// Set a single custom claim.
    pub fn claim<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.claims.insert(name, value);
        self
    }

    /// Make tokens expire this long after they are issued.
    pub fn expires_in(mut self, offset: Duration) -> Self {
        self.expires_in = Some(offset);
        self
    }

    /// Make tokens expire at a fixed point in time.
    ///
    /// An offset set via [`TokenBuilder::expires_in`] takes precedence.
    pub fn expires_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.claims.set_expiration_time(timestamp);
        self
    }

    /// Set the clock tokens are stamped with.
    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Issue a token, signing it with the secret the given provider hands out.
    pub fn issue<P: SecretProvider + ?Sized>(&self, provider: &P) -> Result<String, TokenError> {
        let Self { algorithm, token_type, key_id, claims, expires_in, time_provider } = self;

        let now = time_provider.current_time();
        let mut claims = claims.clone();
        claims.set_issued_at(now).set_id(hex::encode(rand::random::<[u8; 16]>()));
        if let Some(offset) = expires_in {
            let offset = TimeDelta::from_std(*offset).map_err(|_| TokenError::ExpiryOutOfRange)?;
            let expires_at = now.checked_add_signed(offset).ok_or(TokenError::ExpiryOutOfRange)?;
            claims.set_expiration_time(expires_at);
        }

        let mut header = Header { typ: token_type.clone(), alg: *algorithm, kid: key_id.clone(), kms: None };
        let secret = provider.issuance_secret(&mut header, now)?;

        let header_b64 = codec::encode_json(&header)?;
        let claims_b64 = codec::encode_json(&claims)?;
        let message = format!("{header_b64}.{claims_b64}");
        let signature = algorithm.signer().sign(message.as_bytes(), &secret)?;
        let signature_b64 = codec::encode(signature);

        tracing::debug!(jti = claims.id().unwrap_or_default(), kms = header.kms.is_some(), "token issued");
        Ok(format!("{message}.{signature_b64}"))
    }
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBuilder")
            .field("algorithm", &self.algorithm)
            .field("token_type", &self.token_type)
            .field("key_id", &self.key_id)
            .field("claims", &self.claims)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
