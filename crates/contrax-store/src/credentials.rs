//! Typed access to the persisted session keys.

use std::sync::Arc;

use contrax_core::{AuthTokens, User};
use tracing::debug;

use crate::{LocalStorage, StoreError};

pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USER_DATA: &str = "user_data";

/// Everything persisted about a session. Any field may be missing.
#[derive(Debug, Clone, Default)]
pub struct StoredSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

/// Reads and writes `access_token`, `refresh_token` and `user_data` on a
/// [`LocalStorage`] backend.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn LocalStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.storage.get(KEY_ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.storage.get(KEY_REFRESH_TOKEN)
    }

    pub fn user(&self) -> Result<Option<User>, StoreError> {
        match self.storage.get(KEY_USER_DATA)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: KEY_USER_DATA.to_string(),
                    source,
                }),
        }
    }

    pub fn load(&self) -> Result<StoredSession, StoreError> {
        Ok(StoredSession {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
            user: self.user()?,
        })
    }

    pub fn store_tokens(&self, tokens: &AuthTokens) -> Result<(), StoreError> {
        self.storage.set(KEY_ACCESS_TOKEN, &tokens.access)?;
        self.storage.set(KEY_REFRESH_TOKEN, &tokens.refresh)
    }

    /// Replace only the access token (after a refresh).
    pub fn store_access(&self, access: &str) -> Result<(), StoreError> {
        self.storage.set(KEY_ACCESS_TOKEN, access)
    }

    pub fn store_user(&self, user: &User) -> Result<(), StoreError> {
        let json = serde_json::to_string(user)?;
        self.storage.set(KEY_USER_DATA, &json)
    }

    /// Remove all three keys. Attempts every key even if one fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER_DATA] {
            if let Err(e) = self.storage.remove(key) {
                first_err.get_or_insert(e);
            }
        }
        debug!("stored credentials cleared");
        first_err.map_or(Ok(()), Err)
    }
}
