use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// The `iss` claim.
pub const ISSUER: &str = "iss";

/// The `sub` claim.
pub const SUBJECT: &str = "sub";

/// The `aud` claim.
pub const AUDIENCE: &str = "aud";

/// The `exp` claim.
pub const EXPIRATION_TIME: &str = "exp";

/// The `iat` claim.
pub const ISSUED_AT: &str = "iat";

/// The `jti` claim.
pub const TOKEN_ID: &str = "jti";

/// The claims carried in a token's payload.
///
/// Claims are kept in insertion order. The registered claims have typed accessors, everything
/// else is passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(JsonObject);

impl ClaimSet {
    /// Construct an empty claim set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the given claims into this set.
    ///
    /// This is a shallow merge: a claim that already exists is replaced as a whole.
    pub fn merge(&mut self, payload: JsonObject) -> &mut Self {
        for (name, value) in payload {
            self.0.insert(name, value);
        }
        self
    }

    /// Set a single claim.
    pub fn insert<K, V>(&mut self, name: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Set the issuer.
    pub fn set_issuer<T: Into<String>>(&mut self, issuer: T) -> &mut Self {
        self.insert(ISSUER, issuer.into())
    }

    /// Set the subject.
    pub fn set_subject<T: Into<String>>(&mut self, subject: T) -> &mut Self {
        self.insert(SUBJECT, subject.into())
    }

    /// Set the audience.
    pub fn set_audience<T: Into<Audience>>(&mut self, audience: T) -> &mut Self {
        let audience = match audience.into() {
            Audience::Single(audience) => serde_json::Value::from(audience),
            Audience::Multiple(audiences) => serde_json::Value::from(audiences),
        };
        self.insert(AUDIENCE, audience)
    }

    /// Set the unique token identifier.
    pub fn set_id<T: Into<String>>(&mut self, id: T) -> &mut Self {
        self.insert(TOKEN_ID, id.into())
    }

    /// Set the issued at timestamp to the current time.
    pub fn set_issued_at_now(&mut self) -> &mut Self {
        self.set_issued_at(Utc::now())
    }

    /// Set the issued at timestamp.
    pub fn set_issued_at(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.insert(ISSUED_AT, timestamp.timestamp())
    }

    /// Set the absolute time at which the token stops being valid.
    pub fn set_expiration_time(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.insert(EXPIRATION_TIME, timestamp.timestamp())
    }

    /// Get the issuer, if any.
    pub fn issuer(&self) -> Option<&str> {
        self.non_empty_str(ISSUER)
    }

    /// Get the subject, if any.
    pub fn subject(&self) -> Option<&str> {
        self.non_empty_str(SUBJECT)
    }

    /// Get the audience, if any.
    pub fn audience(&self) -> Option<Audience> {
        match self.0.get(AUDIENCE)? {
            serde_json::Value::String(audience) if !audience.is_empty() => Some(Audience::Single(audience.clone())),
            serde_json::Value::Array(values) if !values.is_empty() => {
                let audiences: Vec<String> =
                    values.iter().map(|v| v.as_str().map(ToString::to_string)).collect::<Option<_>>()?;
                Some(Audience::Multiple(audiences))
            }
            _ => None,
        }
    }

    /// Get the unique token identifier, if any.
    pub fn id(&self) -> Option<&str> {
        self.non_empty_str(TOKEN_ID)
    }

    /// Get the issued at timestamp, if any.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.0.get(ISSUED_AT).and_then(numeric_date).and_then(|t| DateTime::from_timestamp(t, 0))
    }

    /// Get the expiration time, if any.
    ///
    /// An expiration time of zero or less means the token never expires and is reported as `None`.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration_timestamp().and_then(|t| DateTime::from_timestamp(t, 0))
    }

    /// Get the raw `exp` timestamp, if present and positive.
    pub(crate) fn expiration_timestamp(&self) -> Option<i64> {
        self.0.get(EXPIRATION_TIME).and_then(numeric_date).filter(|t| *t > 0)
    }

    /// Get a claim by name.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Iterate over all the claims, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// The number of claims in this set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this set has no claims.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the underlying JSON object.
    pub fn as_map(&self) -> &JsonObject {
        &self.0
    }

    /// Consume this set and return the underlying JSON object.
    pub fn into_inner(self) -> JsonObject {
        self.0
    }

    fn non_empty_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(serde_json::Value::as_str).filter(|s| !s.is_empty())
    }
}

impl From<JsonObject> for ClaimSet {
    fn from(claims: JsonObject) -> Self {
        Self(claims)
    }
}

/// The audience of a token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single recipient.
    Single(String),

    /// Multiple recipients.
    Multiple(Vec<String>),
}

impl Audience {
    /// Check whether the given recipient is part of this audience.
    pub fn contains(&self, recipient: &str) -> bool {
        match self {
            Self::Single(audience) => audience == recipient,
            Self::Multiple(audiences) => audiences.iter().any(|a| a == recipient),
        }
    }
}

impl From<&str> for Audience {
    fn from(audience: &str) -> Self {
        Self::Single(audience.to_string())
    }
}

impl From<String> for Audience {
    fn from(audience: String) -> Self {
        Self::Single(audience)
    }
}

impl From<Vec<String>> for Audience {
    fn from(audiences: Vec<String>) -> Self {
        Self::Multiple(audiences)
    }
}

impl<const N: usize> From<[&str; N]> for Audience {
    fn from(audiences: [&str; N]) -> Self {
        Self::Multiple(audiences.iter().map(ToString::to_string).collect())
    }
}

/// Interpret a JSON value as a NumericDate, truncating any fractional seconds.
pub(crate) fn numeric_date(value: &serde_json::Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|t| t.floor() as i64))
}
