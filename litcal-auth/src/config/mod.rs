pub(crate) use crate::config::oidc::OidcConfig;
pub(crate) use crate::config::session::{SessionConfig, SessionStoreKind};
use confique::Config;
use thiserror::Error;
use url::Url;

pub mod oidc;
pub mod session;

/// Environment variable that points at an optional TOML settings file
const CONFIG_FILE_ENV: &str = "LITCAL_AUTH_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "litcal-auth.toml";

/// Errors raised while loading or validating the settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main configuration structure for the authentication server
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the server will listen to (default: 3003)
    #[config(env = "LITCAL_AUTH_PORT", default = 3003)]
    pub port: u16,

    /// Base URL of the calendar front end; every redirect lands on this origin
    #[config(env = "LITCAL_FRONTEND_URL", default = "http://localhost:3000")]
    pub frontend_url: String,

    /// Application environment, "development" enables diagnostics and drops
    /// the Secure cookie attribute (default: production)
    #[config(env = "APP_ENV", default = "production")]
    pub app_env: String,

    /// Optional Domain attribute for the auth cookies
    #[config(env = "LITCAL_COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Identity provider configuration
    #[config(nested)]
    pub oidc: OidcConfig,

    /// Login session store configuration
    #[config(nested)]
    pub session: SessionConfig,
}

impl Settings {
    /// Loads the settings from the environment, then from the optional TOML
    /// file, and validates the result
    pub fn load() -> Result<Self, ConfigError> {
        let file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Settings::builder().env().file(file).load()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values that confique cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        let frontend = self.frontend_base()?;
        if !matches!(frontend.scheme(), "http" | "https") || frontend.host_str().is_none() {
            return Err(ConfigError::invalid(
                "frontend_url",
                "must be an absolute http(s) URL",
            ));
        }

        self.oidc.validate()?;
        self.session.validate()?;
        Ok(())
    }

    /// Whether the server runs in development mode
    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }

    /// Parsed frontend base URL
    pub fn frontend_base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.frontend_url)
            .map_err(|e| ConfigError::invalid("frontend_url", e.to_string()))
    }

    #[cfg(test)]
    pub fn for_test_with_provider(provider_mock: &wiremock::MockServer) -> Self {
        Self {
            port: 0, // Let the OS choose a port
            frontend_url: "https://litcal.example.org".to_string(),
            app_env: "production".to_string(),
            cookie_domain: None,
            oidc: OidcConfig {
                issuer: Some(provider_mock.uri()),
                client_id: Some("litcal-frontend".to_string()),
                client_secret: Some("test-client-secret".to_string()),
                redirect_uri: Some("https://litcal.example.org/auth/callback".to_string()),
                scopes: "openid profile email offline_access".to_string(),
                use_pkce: true,
                roles_claim: "urn:zitadel:iam:org:project:roles".to_string(),
                refresh_token_lifetime: 2_592_000,
                access_token_lifetime: 3600,
                jwks_cache_ttl: 3600,
                request_timeout: 5,
                connect_timeout: 2,
            },
            session: SessionConfig {
                store: "in-memory".to_string(),
                ttl: 600,
                memory_capacity: 16,
                redis_url: None,
                cookie_name: "litcal_session".to_string(),
            },
        }
    }
}
