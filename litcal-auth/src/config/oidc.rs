//! OpenID Connect provider configuration

use super::ConfigError;
use confique::Config;
use url::Url;

/// OpenID Connect (Zitadel) configuration
#[derive(Debug, Config, Clone)]
pub struct OidcConfig {
    /// Issuer URL of the identity provider
    #[config(env = "ZITADEL_ISSUER")]
    pub issuer: Option<String>,

    /// OAuth client identifier, also the expected token audience
    #[config(env = "ZITADEL_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[config(env = "ZITADEL_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider, points at /auth/callback
    #[config(env = "ZITADEL_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Space-separated scopes requested at login
    /// (default: "openid profile email offline_access")
    #[config(env = "ZITADEL_SCOPES", default = "openid profile email offline_access")]
    pub scopes: String,

    /// Send a PKCE S256 challenge with the authorization request (default: true)
    #[config(env = "ZITADEL_USE_PKCE", default = true)]
    pub use_pkce: bool,

    /// Claim holding the project roles map
    /// (default: "urn:zitadel:iam:org:project:roles")
    #[config(
        env = "ZITADEL_ROLES_CLAIM",
        default = "urn:zitadel:iam:org:project:roles"
    )]
    pub roles_claim: String,

    /// Lifetime of the refresh token cookie in seconds (default: 2592000 = 30 days)
    #[config(env = "REFRESH_TOKEN_LIFETIME", default = 2592000)]
    pub refresh_token_lifetime: u64,

    /// Access token lifetime in seconds when the provider omits expires_in
    /// (default: 3600)
    #[config(env = "ACCESS_TOKEN_FALLBACK_LIFETIME", default = 3600)]
    pub access_token_lifetime: u64,

    /// JWKS cache TTL in seconds (default: 3600 = 1 hour)
    #[config(env = "ZITADEL_JWKS_CACHE_TTL", default = 3600)]
    pub jwks_cache_ttl: u64,

    /// Timeout for provider requests in seconds (default: 10)
    #[config(env = "ZITADEL_REQUEST_TIMEOUT", default = 10)]
    pub request_timeout: u64,

    /// Timeout for provider connections in seconds (default: 5)
    #[config(env = "ZITADEL_CONNECT_TIMEOUT", default = 5)]
    pub connect_timeout: u64,
}

impl OidcConfig {
    /// Whether the minimum configuration for the authorization code flow
    /// is present
    pub fn is_configured(&self) -> bool {
        [
            &self.issuer,
            &self.client_id,
            &self.client_secret,
            &self.redirect_uri,
        ]
        .iter()
        .all(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Issuer without a trailing slash
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref().map(|issuer| issuer.trim_end_matches('/'))
    }

    /// Returns a provider URL for the given path below the issuer
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let issuer = self.issuer()?;
        if path.starts_with('/') {
            Some(format!("{}{}", issuer, path))
        } else {
            Some(format!("{}/{}", issuer, path))
        }
    }

    /// Scopes as a vector
    pub fn get_scopes(&self) -> Vec<String> {
        self.scopes
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }

    /// Partial configuration is allowed, malformed URLs are not
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(issuer) = self.issuer.as_deref().filter(|v| !v.is_empty()) {
            Url::parse(issuer).map_err(|e| ConfigError::invalid("oidc.issuer", e.to_string()))?;
        }
        if let Some(redirect_uri) = self.redirect_uri.as_deref().filter(|v| !v.is_empty()) {
            Url::parse(redirect_uri)
                .map_err(|e| ConfigError::invalid("oidc.redirect_uri", e.to_string()))?;
        }
        if self.get_scopes().iter().all(|scope| scope != "openid") {
            return Err(ConfigError::invalid(
                "oidc.scopes",
                "the openid scope is required",
            ));
        }
        Ok(())
    }
}
