//! Access and ID token verification against the provider JWKS

use super::jwks::{JwksCache, JwksError};
use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, jwk::Jwk, jwk::KeyAlgorithm, Algorithm,
    DecodingKey, Validation,
};
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token issuer")]
    InvalidIssuer,
    #[error("Invalid token audience")]
    InvalidAudience,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("No signing key found for token")]
    KeyNotFound,
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error(transparent)]
    Jwks(JwksError),
}

impl VerifyError {
    /// Message safe to return to the browser
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Expired => "Token expired",
            Self::InvalidIssuer => "Invalid token issuer",
            Self::InvalidAudience => "Invalid token audience",
            Self::Jwks(_) => "Token validation failed",
            _ => "Invalid token",
        }
    }
}

impl From<JwksError> for VerifyError {
    fn from(error: JwksError) -> Self {
        match error {
            JwksError::KeyNotFound(_) => Self::KeyNotFound,
            other => Self::Jwks(other),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm(error.to_string())
            }
            _ => Self::Malformed(error.to_string()),
        }
    }
}

/// Claims of a token whose signature, issuer, audience and expiry were checked
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VerifiedClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    pub iss: String,
    /// String or array, as issued
    pub aud: serde_json::Value,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl VerifiedClaims {
    /// Role names from a claim holding a `{role: {...}}` map, sorted
    pub fn roles(&self, claim: &str) -> Vec<String> {
        let mut roles: Vec<String> = match self.extra.get(claim) {
            Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        roles.sort();
        roles
    }
}

#[derive(Clone)]
pub struct TokenVerifier {
    jwks: JwksCache,
    jwks_uri: String,
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    pub fn new(
        jwks: JwksCache,
        jwks_uri: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            jwks,
            jwks_uri: jwks_uri.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Verifies a token against the current time
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerifyError> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Verifies a token as of `now` (unix seconds); `exp <= now` is expired
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedClaims, VerifyError> {
        let header = decode_header(token)?;
        if matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(VerifyError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let jwk = self
            .jwks
            .find_key(&self.jwks_uri, header.kid.as_deref())
            .await?;
        if !key_allows(&jwk, header.alg) {
            return Err(VerifyError::UnsupportedAlgorithm(format!(
                "{:?} does not match the signing key",
                header.alg
            )));
        }
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;
        // expiry is checked below against the caller's clock
        validation.validate_exp = false;

        let claims = decode::<VerifiedClaims>(token, &key, &validation)?.claims;
        if claims.exp <= now {
            return Err(VerifyError::Expired);
        }

        debug!("Verified token for subject {}", claims.sub);
        Ok(claims)
    }
}

/// A key that names its algorithm may only verify tokens of that algorithm
fn key_allows(jwk: &Jwk, alg: Algorithm) -> bool {
    let Some(key_alg) = jwk.common.key_algorithm.as_ref() else {
        return true;
    };
    matches!(
        (key_alg, alg),
        (KeyAlgorithm::RS256, Algorithm::RS256)
            | (KeyAlgorithm::RS384, Algorithm::RS384)
            | (KeyAlgorithm::RS512, Algorithm::RS512)
            | (KeyAlgorithm::PS256, Algorithm::PS256)
            | (KeyAlgorithm::PS384, Algorithm::PS384)
            | (KeyAlgorithm::PS512, Algorithm::PS512)
            | (KeyAlgorithm::ES256, Algorithm::ES256)
            | (KeyAlgorithm::ES384, Algorithm::ES384)
            | (KeyAlgorithm::EdDSA, Algorithm::EdDSA)
    )
}
