//! Persisted session: bearer token, last user and backend base URL.
//!
//! [`Session`] is a thin typed view over a [`KeyValueStore`]. It is also
//! the [`TokenProvider`] handed to [`crate::api::ApiClient`], so the token
//! written by login is the one read by the next authenticated call without
//! any process-wide singleton.

use crate::config::{is_http_url, ClientConfig};
use crate::error::OnboardingError;
use crate::model::AuthenticatedUser;
use secrecy::{ExposeSecret, SecretString};
use sirac_keystore::{
    FileStore, KeyValueStore, MemoryStore, API_BASE_URL_KEY, AUTH_TOKEN_KEY, USER_DATA_KEY,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Namespace used by the CLI's file-backed store.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Supplies the bearer token for authenticated requests.
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` when logged out.
    fn token(&self) -> Option<SecretString>;
}

/// A fixed token; handy for one-off calls and tests.
pub struct StaticToken(pub Option<SecretString>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<SecretString> {
        self.0.clone()
    }
}

/// Typed access to the three persisted session entries.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// A session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The file-backed session under the platform data directory.
    pub fn open_default() -> Result<Self, OnboardingError> {
        let store = FileStore::open_default(DEFAULT_NAMESPACE)?;
        debug!("Session store: {}", store.path().display());
        Ok(Self::new(Arc::new(store)))
    }

    /// Persist the outcome of a successful login.
    pub fn store_login(
        &self,
        token: &SecretString,
        user: &AuthenticatedUser,
    ) -> Result<(), OnboardingError> {
        let user_json = serde_json::to_string(user)
            .map_err(|e| OnboardingError::Internal(format!("cannot encode user: {e}")))?;
        self.store.set(AUTH_TOKEN_KEY, token.expose_secret())?;
        self.store.set(USER_DATA_KEY, &user_json)?;
        Ok(())
    }

    /// Forget the token and user. The base URL is kept.
    pub fn logout(&self) -> Result<(), OnboardingError> {
        self.store.remove(AUTH_TOKEN_KEY)?;
        self.store.remove(USER_DATA_KEY)?;
        Ok(())
    }

    pub fn auth_token(&self) -> Result<Option<SecretString>, OnboardingError> {
        Ok(self
            .store
            .get(AUTH_TOKEN_KEY)?
            .filter(|t| !t.is_empty())
            .map(SecretString::from))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.auth_token(), Ok(Some(_)))
    }

    /// The last logged-in user.
    ///
    /// An unreadable entry is logged and treated as absent.
    pub fn user(&self) -> Result<Option<AuthenticatedUser>, OnboardingError> {
        let Some(raw) = self.store.get(USER_DATA_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!("Ignoring unreadable stored user: {}", e);
                Ok(None)
            }
        }
    }

    /// Effective base URL: the stored one if set, else the configured one.
    pub fn base_url(&self, config: &ClientConfig) -> Result<String, OnboardingError> {
        Ok(self
            .store
            .get(API_BASE_URL_KEY)?
            .filter(|u| is_http_url(u))
            .unwrap_or_else(|| config.base_url.clone()))
    }

    /// Remember a base URL for later runs.
    pub fn set_base_url(&self, url: &str) -> Result<(), OnboardingError> {
        let url = url.trim().trim_end_matches('/');
        if !is_http_url(url) {
            return Err(OnboardingError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{url}'"
            )));
        }
        self.store.set(API_BASE_URL_KEY, url)?;
        Ok(())
    }

    pub fn clear_base_url(&self) -> Result<(), OnboardingError> {
        self.store.remove(API_BASE_URL_KEY)?;
        Ok(())
    }
}

impl TokenProvider for Session {
    fn token(&self) -> Option<SecretString> {
        match self.auth_token() {
            Ok(token) => token,
            Err(e) => {
                warn!("Token store unavailable: {}", e);
                None
            }
        }
    }
}
