use crate::config::{OidcConfig, Settings};
use crate::cookies::CookiePolicy;
use crate::oidc::OidcClient;
use crate::session::{create_session_store, SessionBackend, SessionStore};
use log::warn;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised while building the application state
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("Failed to create session store: {0}")]
    Session(#[from] crate::session::SessionError),
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Parsed frontend base URL, every redirect lands on this origin
    pub frontend: Arc<Url>,
    pub cookie_policy: CookiePolicy,
    pub sessions: Arc<SessionStore>,
    pub oidc: Arc<OidcClient>,
}

impl AppState {
    fn create_provider_client(config: &OidcConfig) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            // Configure connection pool
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .user_agent(concat!("litcal-auth/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    pub async fn new(settings: Settings) -> Result<Self, StateError> {
        let sessions = create_session_store(&settings.session).await?;
        Self::with_session_store(settings, sessions)
    }

    pub fn with_session_store(
        settings: Settings,
        sessions: SessionStore,
    ) -> Result<Self, StateError> {
        let frontend = settings.frontend_base()?;
        if !settings.oidc.is_configured() {
            warn!("OIDC settings are incomplete, auth endpoints will answer 503");
        }

        let http = Self::create_provider_client(&settings.oidc)?;
        Ok(Self {
            frontend: Arc::new(frontend),
            cookie_policy: CookiePolicy::from_settings(&settings),
            sessions: Arc::new(sessions),
            oidc: Arc::new(OidcClient::new(settings.oidc.clone(), http)),
            settings: Arc::new(settings),
        })
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> Result<(), String> {
        self.sessions.health_check().await
    }

    #[cfg(test)]
    pub fn for_testing(settings: &Settings) -> Self {
        let sessions = SessionStore::InMemory(
            crate::session::memory::InMemorySessionStore::new(
                settings.session.ttl,
                settings.session.memory_capacity,
            )
            .unwrap(),
        );
        Self::with_session_store(settings.clone(), sessions).unwrap()
    }
}
