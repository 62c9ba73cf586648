//! Federated sign-in
//!
//! A [`FederatedProvider`] turns some external proof of identity into a
//! [`FederatedIdentity`]. The bundled [`HmacAssertionProvider`] accepts a
//! compact signed assertion:
//!
//! ```text
//! base64url(claims-json) "." base64url(HMAC-SHA256(secret, base64url(claims-json)))
//! ```
//!
//! with claims `{"sub": ..., "email": ..., "iat": <unix seconds>}`.

use super::AuthError;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::hmac;
use serde::{Deserialize, Serialize};

/// Identity asserted by a federated provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub provider: String,
    /// Provider-scoped stable account id
    pub subject: String,
    pub email: Option<String>,
}

/// External identity provider
#[async_trait]
pub trait FederatedProvider: Send + Sync {
    /// Provider name recorded on the account
    fn name(&self) -> &str;

    /// Obtain and verify the user's identity
    async fn authenticate(&self) -> Result<FederatedIdentity, AuthError>;
}

/// Claims carried by a signed assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Issued-at, Unix seconds
    pub iat: i64,
}

/// Provider verifying HMAC-SHA256 signed assertions
pub struct HmacAssertionProvider {
    name: String,
    secret: String,
    assertion: String,
}

impl HmacAssertionProvider {
    pub fn new(
        name: impl Into<String>,
        secret: impl Into<String>,
        assertion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            assertion: assertion.into(),
        }
    }

    /// Maximum allowed age of an assertion (seconds).
    pub fn max_assertion_age(&self) -> i64 {
        300
    }

    /// Verify the assertion against `now` (Unix seconds)
    pub fn verify_at(&self, now: i64) -> Result<FederatedIdentity, AuthError> {
        let (payload, signature) = self
            .assertion
            .split_once('.')
            .ok_or_else(|| self.reject("malformed assertion"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| self.reject("malformed signature"))?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, self.secret.as_bytes());
        hmac::verify(&key, payload.as_bytes(), &signature)
            .map_err(|_| self.reject("invalid signature"))?;

        let claims: AssertionClaims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| self.reject("malformed claims"))?;

        // Replay protection
        if (now - claims.iat).abs() > self.max_assertion_age() {
            return Err(self.reject("assertion expired"));
        }
        if claims.sub.is_empty() {
            return Err(self.reject("missing subject"));
        }

        Ok(FederatedIdentity {
            provider: self.name.clone(),
            subject: claims.sub,
            email: claims.email,
        })
    }

    fn reject(&self, reason: &str) -> AuthError {
        AuthError::Provider {
            provider: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl FederatedProvider for HmacAssertionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self) -> Result<FederatedIdentity, AuthError> {
        self.verify_at(chrono::Utc::now().timestamp())
    }
}

/// Produce a signed assertion for `claims`
pub fn sign_assertion(secret: &str, claims: &AssertionClaims) -> String {
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, payload.as_bytes());
    format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(tag.as_ref()))
}
