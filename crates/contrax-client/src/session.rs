//! Explicit authentication session.
//!
//! A [`Session`] is built once, wrapped in an `Arc`, and handed to every
//! consumer (API client, CLI, proxy tests). It owns the in-memory copy of
//! the token pair and user, and mirrors every change into the
//! [`CredentialStore`].
//!
//! Lifecycle: `load` (read storage) → `begin_validation` / `establish`
//! (validate, possibly after a refresh) → `update_access` (refresh) →
//! `clear` (logout or failed refresh).

use std::sync::{Mutex, MutexGuard};

use contrax_core::{AuthState, AuthTokens, User};
use contrax_store::{CredentialStore, StoreError, StoredSession};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Inner {
    state: AuthState,
    user: Option<User>,
    access: Option<String>,
    refresh: Option<String>,
}

pub struct Session {
    store: CredentialStore,
    inner: Mutex<Inner>,
}

impl Session {
    /// New session in `Unauthenticated`, nothing loaded yet.
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // The guarded data stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read persisted credentials into memory without contacting the backend.
    ///
    /// The state stays `Unauthenticated` until validated; requests made in
    /// the meantime still carry the stored bearer token.
    pub fn load(&self) -> Result<StoredSession, StoreError> {
        let stored = self.store.load()?;
        let mut inner = self.inner();
        inner.access = stored.access_token.clone();
        inner.refresh = stored.refresh_token.clone();
        inner.user = stored.user.clone();
        Ok(stored)
    }

    pub fn state(&self) -> AuthState {
        self.inner().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.inner().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner().refresh.clone()
    }

    pub fn begin_validation(&self) {
        self.inner().state = AuthState::Authenticating;
    }

    /// Record a validated session and persist it.
    pub fn establish(&self, user: User, tokens: AuthTokens) -> Result<(), StoreError> {
        self.store.store_tokens(&tokens)?;
        self.store.store_user(&user)?;
        info!(username = %user.username, "session established");
        let mut inner = self.inner();
        inner.access = Some(tokens.access);
        inner.refresh = Some(tokens.refresh);
        inner.user = Some(user);
        inner.state = AuthState::Authenticated;
        Ok(())
    }

    /// Store a refreshed access token (and a rotated refresh token, if any).
    pub fn update_access(&self, access: &str, rotated: Option<&str>) -> Result<(), StoreError> {
        match rotated {
            Some(refresh) => self.store.store_tokens(&AuthTokens {
                access: access.to_string(),
                refresh: refresh.to_string(),
            })?,
            None => self.store.store_access(access)?,
        }
        let mut inner = self.inner();
        inner.access = Some(access.to_string());
        if let Some(refresh) = rotated {
            inner.refresh = Some(refresh.to_string());
        }
        Ok(())
    }

    pub fn update_user(&self, user: User) -> Result<(), StoreError> {
        self.store.store_user(&user)?;
        self.inner().user = Some(user);
        Ok(())
    }

    /// Validation finished without a usable session; keep stored credentials.
    pub fn mark_unauthenticated(&self) {
        self.inner().state = AuthState::Unauthenticated;
    }

    /// Drop every credential, in memory and in storage, and become
    /// `Unauthenticated`. Memory is cleared even if storage fails.
    pub fn clear(&self) {
        {
            let mut inner = self.inner();
            *inner = Inner::default();
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored credentials");
        }
    }
}
