//! Cached retrieval of the provider's JSON Web Key Set

use jsonwebtoken::jwk::{Jwk, JwkSet};
use log::{debug, warn};
use moka::future::Cache as MokaCache;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Maximum accepted JWKS document size (1 MiB)
const MAX_JWKS_RESPONSE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Error)]
pub enum JwksError {
    #[error("Failed to fetch JWKS: {0}")]
    Fetch(String),
    #[error("Failed to parse JWKS: {0}")]
    Parse(String),
    #[error("No key found for kid {0:?}")]
    KeyNotFound(Option<String>),
}

impl JwksError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

/// JWKS cache keyed by JWKS URI.
///
/// Concurrent misses for the same URI share one fetch. Entries expire after
/// the configured TTL, and an unknown `kid` triggers a single refetch so that
/// rotated keys are picked up before the TTL runs out.
#[derive(Clone)]
pub struct JwksCache {
    http: Client,
    keys: MokaCache<String, Arc<JwkSet>>,
}

impl JwksCache {
    pub fn new(http: Client, ttl_secs: u64) -> Self {
        let keys = MokaCache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { http, keys }
    }

    /// Returns the key set for `jwks_uri`, fetching it on a cache miss
    pub async fn get(&self, jwks_uri: &str) -> Result<Arc<JwkSet>, JwksError> {
        let http = self.http.clone();
        let uri = jwks_uri.to_string();
        self.keys
            .try_get_with(jwks_uri.to_string(), async move {
                debug!("JWKS cache miss, fetching {}", uri);
                fetch_with_retry(&http, &uri).await.map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Finds the signing key for a token.
    ///
    /// Without a `kid` the set must contain exactly one key.
    pub async fn find_key(&self, jwks_uri: &str, kid: Option<&str>) -> Result<Jwk, JwksError> {
        let jwks = self.get(jwks_uri).await?;
        if let Some(key) = select_key(&jwks, kid) {
            return Ok(key);
        }

        // Keys may have been rotated since the set was cached
        warn!("Signing key {:?} not in cached JWKS, refetching", kid);
        self.keys.invalidate(jwks_uri).await;
        let jwks = self.get(jwks_uri).await?;
        select_key(&jwks, kid).ok_or_else(|| JwksError::KeyNotFound(kid.map(str::to_string)))
    }
}

fn select_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => jwks.find(kid).cloned(),
        None if jwks.keys.len() == 1 => jwks.keys.first().cloned(),
        None => None,
    }
}

/// GET is idempotent, so a failed fetch is retried once
async fn fetch_with_retry(http: &Client, jwks_uri: &str) -> Result<JwkSet, JwksError> {
    match fetch(http, jwks_uri).await {
        Err(e) if e.is_retryable() => {
            warn!("JWKS fetch failed, retrying once: {}", e);
            fetch(http, jwks_uri).await
        }
        result => result,
    }
}

async fn fetch(http: &Client, jwks_uri: &str) -> Result<JwkSet, JwksError> {
    let response = http
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| JwksError::Fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(JwksError::Fetch(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| JwksError::Fetch(e.to_string()))?;
    if bytes.len() > MAX_JWKS_RESPONSE_SIZE {
        return Err(JwksError::Parse(format!(
            "response of {} bytes exceeds the limit",
            bytes.len()
        )));
    }

    let jwks: JwkSet =
        serde_json::from_slice(&bytes).map_err(|e| JwksError::Parse(e.to_string()))?;
    debug!("Fetched JWKS with {} keys", jwks.keys.len());
    Ok(jwks)
}
