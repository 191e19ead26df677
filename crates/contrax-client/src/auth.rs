//! Login, registration, session restore and logout.

use contrax_core::{AuthResponse, LoginCredentials, Registration, User};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};

/// Outcome of [`ApiClient::restore_session`].
#[derive(Debug, Clone, PartialEq)]
pub enum Restored {
    /// Stored tokens were valid (possibly after one refresh).
    Authenticated(User),
    /// Nothing usable was stored, or the backend rejected it.
    Unauthenticated,
}

impl ApiClient {
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, ApiError> {
        credentials.validate().map_err(ApiError::Invalid)?;
        let req = ApiRequest::post("/api/auth/login/")
            .json(credentials)?
            .anonymous();
        let resp: AuthResponse = self.fetch(&req).await?;
        info!(username = %resp.user.username, "logged in");
        self.session().establish(resp.user.clone(), resp.tokens)?;
        Ok(resp.user)
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        registration.validate().map_err(ApiError::Invalid)?;
        let req = ApiRequest::post("/api/auth/register/")
            .json(registration)?
            .anonymous();
        let resp: AuthResponse = self.fetch(&req).await?;
        info!(username = %resp.user.username, "registered");
        self.session().establish(resp.user.clone(), resp.tokens)?;
        Ok(resp.user)
    }

    /// `GET /api/auth/user/` through the normal refresh policy.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let user: User = self.fetch(&ApiRequest::get("/api/auth/user/")).await?;
        self.session().update_user(user.clone())?;
        Ok(user)
    }

    /// `GET /api/auth/user/` with an explicit token and no refresh.
    pub async fn fetch_user(&self, access: &str) -> Result<User, ApiError> {
        self.fetch_as(&ApiRequest::get("/api/auth/user/"), access)
            .await
    }

    /// Exchange the stored refresh token for a new access token.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let refresh = self
            .session()
            .refresh_token()
            .ok_or(ApiError::SessionExpired)?;
        self.refresh_with(&refresh).await
    }

    /// Validate persisted credentials against the backend.
    ///
    /// Reads storage, validates the access token, refreshes once if the
    /// token is rejected and validates again. Rejected credentials are
    /// cleared. A backend that cannot be reached leaves storage untouched.
    pub async fn restore_session(&self) -> Result<Restored, ApiError> {
        let session = self.session();
        let stored = session.load()?;
        let (Some(access), Some(refresh)) = (stored.access_token, stored.refresh_token) else {
            debug!("no stored token pair");
            session.mark_unauthenticated();
            return Ok(Restored::Unauthenticated);
        };

        session.begin_validation();
        match self.fetch_user(&access).await {
            Ok(user) => return self.finish_restore(user, access, refresh),
            Err(ApiError::Unauthorized { .. }) => {
                debug!("stored access token rejected, refreshing");
            }
            Err(e) => {
                session.mark_unauthenticated();
                return Err(e);
            }
        }

        let access = match self.refresh_with(&refresh).await {
            Ok(access) => access,
            Err(e) if !e.is_rejection() => {
                session.mark_unauthenticated();
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "stored refresh token rejected; clearing session");
                session.clear();
                return Ok(Restored::Unauthenticated);
            }
        };
        // A rotated refresh token was already stored by refresh_with.
        let refresh = session.refresh_token().unwrap_or(refresh);

        match self.fetch_user(&access).await {
            Ok(user) => self.finish_restore(user, access, refresh),
            Err(e) if !e.is_rejection() => {
                session.mark_unauthenticated();
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "refreshed token rejected; clearing session");
                session.clear();
                Ok(Restored::Unauthenticated)
            }
        }
    }

    fn finish_restore(
        &self,
        user: User,
        access: String,
        refresh: String,
    ) -> Result<Restored, ApiError> {
        let tokens = contrax_core::AuthTokens { access, refresh };
        self.session().establish(user.clone(), tokens)?;
        Ok(Restored::Authenticated(user))
    }

    /// Tell the backend to blacklist the refresh token, then clear local
    /// credentials whatever the outcome.
    pub async fn logout(&self) {
        let session = self.session();
        if let Some(refresh) = session.refresh_token() {
            let req = ApiRequest::post("/api/auth/logout/").json(&json!({ "refresh": refresh }));
            let result = match req {
                Ok(req) => self.send(&req).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(error = %e, "logout request failed; clearing local session anyway");
            }
        }
        session.clear();
        info!("logged out");
    }
}
