use super::ConfigError;
use confique::Config;
use std::str::FromStr;

/// Specifies which session store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStoreKind {
    #[default]
    InMemory,
    Redis,
}

impl FromStr for SessionStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in-memory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::invalid(
                "session.store",
                format!("unknown store '{other}', expected 'in-memory' or 'redis'"),
            )),
        }
    }
}

/// Configuration for the server-side login session store
#[derive(Debug, Config, Clone)]
pub struct SessionConfig {
    /// Store type: "in-memory" or "redis" (default: in-memory)
    #[config(env = "LITCAL_SESSION_STORE", default = "in-memory")]
    pub store: String,

    /// Session TTL in seconds, bounds how long a login may take (default: 600)
    #[config(env = "LITCAL_SESSION_TTL", default = 600)]
    pub ttl: u64,

    /// Maximum in-memory capacity in MiB (default: 16 MiB)
    #[config(env = "LITCAL_SESSION_MEMORY_CAPACITY", default = 16)]
    pub memory_capacity: usize,

    /// Redis connection string
    #[config(env = "LITCAL_SESSION_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Name of the cookie carrying the session id (default: litcal_session)
    #[config(env = "LITCAL_SESSION_COOKIE", default = "litcal_session")]
    pub cookie_name: String,
}

impl SessionConfig {
    /// Parsed store kind
    pub fn store_kind(&self) -> Result<SessionStoreKind, ConfigError> {
        self.store.parse()
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.store_kind()?;
        if kind == SessionStoreKind::Redis
            && self.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::invalid(
                "session.redis_url",
                "a Redis URL is required for the redis session store",
            ));
        }
        if self.ttl == 0 {
            return Err(ConfigError::invalid("session.ttl", "must be positive"));
        }
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::invalid("session.cookie_name", "must not be empty"));
        }
        Ok(())
    }
}
