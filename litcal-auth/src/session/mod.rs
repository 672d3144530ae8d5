use crate::config::{SessionConfig, SessionStoreKind};
use crate::oidc::pkce::random_token;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during session store operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse session: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Login state kept between `/auth/login` and `/auth/callback`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginSession {
    /// Anti-CSRF value echoed back by the provider
    pub state: String,
    /// PKCE verifier, present when PKCE is enabled
    pub code_verifier: Option<String>,
    /// Same-origin URL to land on after the callback
    pub return_to: Option<String>,
    /// Unix timestamp of the login attempt
    pub created_at: i64,
}

/// Session id taken from the session cookie, or a freshly generated one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub is_new: bool,
}

impl SessionHandle {
    /// Reuses an existing id when the cookie value looks like one of ours
    pub fn from_cookie(value: Option<&str>) -> Self {
        match value.filter(|id| is_valid_session_id(id)) {
            Some(id) => Self {
                id: id.to_string(),
                is_new: false,
            },
            None => Self {
                id: random_token(),
                is_new: true,
            },
        }
    }
}

fn is_valid_session_id(id: &str) -> bool {
    (16..=128).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub(crate) fn session_key(id: &str) -> String {
    format!("session:{id}")
}

/// Session store trait defining the interface for all backends.
///
/// Values are stored as JSON under a string key and expire after the
/// configured TTL. Implementations must be thread-safe and cheap to clone.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Store a value with the store TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T)
        -> Result<(), SessionError>;

    /// Retrieve a value
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError>;

    /// Returns Ok(()) if the backend is reachable
    async fn health_check(&self) -> Result<(), String>;

    /// Delete a value, missing keys are not an error
    async fn delete(&self, key: &str) -> Result<(), SessionError>;
}

/// Session store with the backend chosen at start-up
#[derive(Clone)]
pub enum SessionStore {
    /// In-memory store using Moka, sessions are lost on restart
    InMemory(memory::InMemorySessionStore),
    /// Redis store shared between instances
    Redis(redis::RedisSessionStore),
}

#[async_trait::async_trait]
impl SessionBackend for SessionStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        match self {
            Self::InMemory(store) => store.set(key, value).await,
            Self::Redis(store) => store.set(key, value).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self {
            Self::InMemory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        match self {
            Self::InMemory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }
}

impl SessionStore {
    /// Loads the login state of a session
    pub async fn load_login(&self, session_id: &str) -> Result<Option<LoginSession>, SessionError> {
        self.get(&session_key(session_id)).await
    }

    /// Replaces the login state of a session
    pub async fn save_login(
        &self,
        session_id: &str,
        session: &LoginSession,
    ) -> Result<(), SessionError> {
        self.set(&session_key(session_id), session).await
    }

    /// Removes all server-side data of a session
    pub async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        self.delete(&session_key(session_id)).await
    }
}

/// Creates the session store selected by the configuration
pub async fn create_session_store(config: &SessionConfig) -> Result<SessionStore, SessionError> {
    let kind = config
        .store_kind()
        .map_err(|e| SessionError::Config(e.to_string()))?;
    match kind {
        SessionStoreKind::InMemory => {
            let store = memory::InMemorySessionStore::new(config.ttl, config.memory_capacity)
                .map_err(SessionError::Config)?;
            Ok(SessionStore::InMemory(store))
        }
        SessionStoreKind::Redis => {
            let url = config.redis_url.as_deref().unwrap_or_default();
            if url.is_empty() {
                return Err(SessionError::Config(
                    "Redis URL is required for the Redis session store".to_string(),
                ));
            }
            let store = redis::RedisSessionStore::new(url, config.ttl)
                .await
                .map_err(SessionError::Config)?;
            Ok(SessionStore::Redis(store))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::session::memory::InMemorySessionStore;

    fn login(state: &str) -> LoginSession {
        LoginSession {
            state: state.to_string(),
            code_verifier: Some("verifier".to_string()),
            return_to: Some("https://litcal.example.org/admin".to_string()),
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_login_session_lifecycle() {
        let store = SessionStore::InMemory(InMemorySessionStore::new(60, 16).unwrap());
        let handle = SessionHandle::from_cookie(None);

        assert_eq!(store.load_login(&handle.id).await.unwrap(), None);

        store.save_login(&handle.id, &login("state-1")).await.unwrap();
        assert_eq!(
            store.load_login(&handle.id).await.unwrap(),
            Some(login("state-1"))
        );

        // a second login attempt replaces the first
        store.save_login(&handle.id, &login("state-2")).await.unwrap();
        assert_eq!(
            store.load_login(&handle.id).await.unwrap().map(|s| s.state),
            Some("state-2".to_string())
        );

        store.destroy(&handle.id).await.unwrap();
        assert_eq!(store.load_login(&handle.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::InMemory(InMemorySessionStore::new(60, 16).unwrap());
        let first = SessionHandle::from_cookie(None);
        let second = SessionHandle::from_cookie(None);
        assert_ne!(first.id, second.id);

        store.save_login(&first.id, &login("first")).await.unwrap();
        assert_eq!(store.load_login(&second.id).await.unwrap(), None);
    }

    #[test]
    fn test_session_handle_from_cookie() {
        let fresh = SessionHandle::from_cookie(None);
        assert!(fresh.is_new);
        assert!(is_valid_session_id(&fresh.id));

        let reused = SessionHandle::from_cookie(Some(&fresh.id));
        assert!(!reused.is_new);
        assert_eq!(reused.id, fresh.id);

        // anything that does not look like a generated id is replaced
        let replaced = SessionHandle::from_cookie(Some("short"));
        assert!(replaced.is_new);
        let replaced = SessionHandle::from_cookie(Some("../../etc/passwd/with/enough/length"));
        assert!(replaced.is_new);
    }

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let config = SessionConfig {
            store: "in-memory".to_string(),
            ttl: 600,
            memory_capacity: 16,
            redis_url: None,
            cookie_name: "litcal_session".to_string(),
        };
        let store = create_session_store(&config).await.unwrap();
        assert!(matches!(store, SessionStore::InMemory(_)));
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_redis_store_without_url() {
        let config = SessionConfig {
            store: "redis".to_string(),
            ttl: 600,
            memory_capacity: 16,
            redis_url: None,
            cookie_name: "litcal_session".to_string(),
        };
        assert!(matches!(
            create_session_store(&config).await,
            Err(SessionError::Config(_))
        ));
    }
}
