//! Signed session blobs carried by join messages.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Blob failed verification or could not be parsed.
    #[error("Invalid session: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    /// Blob could not be signed.
    #[error("Failed to sign session: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

/// Verified session data handed to [`Component::mount`](crate::Component::mount).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Value);

impl SessionData {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Session with no fields.
    #[must_use]
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Look up a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The `_csrf_token` the session was issued with.
    #[must_use]
    pub fn csrf_token(&self) -> Option<&str> {
        self.get("_csrf_token").and_then(Value::as_str)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for SessionData {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Verifies signed session blobs.
pub trait SessionCodec: Send + Sync {
    /// Verify `blob` against `secret` and return its data.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Invalid`] if the signature or the payload is
    /// not valid.
    fn verify(&self, blob: &str, secret: &str) -> Result<SessionData, SessionError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
}

/// HS256 JSON Web Token sessions.
///
/// `exp` is optional; when present it is enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtSessionCodec;

impl JwtSessionCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sign session data without expiry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encode`] if the token cannot be built.
    pub fn sign(&self, data: &Value, secret: &str) -> Result<String, SessionError> {
        self.encode(data, None, secret)
    }

    /// Sign session data that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encode`] if the token cannot be built.
    pub fn sign_with_ttl(
        &self,
        data: &Value,
        ttl: Duration,
        secret: &str,
    ) -> Result<String, SessionError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.encode(data, Some((now + ttl).as_secs()), secret)
    }

    fn encode(&self, data: &Value, exp: Option<u64>, secret: &str) -> Result<String, SessionError> {
        let claims = Claims {
            data: data.clone(),
            exp,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(SessionError::Encode)
    }
}

impl SessionCodec for JwtSessionCodec {
    fn verify(&self, blob: &str, secret: &str) -> Result<SessionData, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let token = jsonwebtoken::decode::<Claims>(
            blob,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(SessionError::Invalid)?;

        Ok(SessionData(token.claims.data))
    }
}
