//! Authenticated HTTP transport for the analysis backend.
//!
//! Every call goes through [`ApiClient::send`], which picks the
//! `Authorization` header (bearer token, else the configured dev fallback,
//! else none) and applies the 401 policy: one refresh, one retry, and a
//! cleared session when the refresh is rejected.

use std::sync::Arc;

use contrax_core::{ClientConfig, RefreshResponse, RetryPolicy};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::session::Session;

/// One backend call, kept as data so it can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Attach credentials and apply the 401 refresh policy.
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Credential {
    Bearer(String),
    Basic(String),
    Anonymous,
}

impl Credential {
    fn header(&self) -> Option<String> {
        match self {
            Self::Bearer(token) => Some(format!("Bearer {token}")),
            Self::Basic(header) => Some(header.clone()),
            Self::Anonymous => None,
        }
    }
}

/// HTTP client bound to one backend and one [`Session`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: Arc<Session>,
    // Single-flight for token refreshes triggered by concurrent 401s.
    refresh_lock: Arc<Mutex<()>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<Session>) -> Self {
        Self::with_http(reqwest::Client::new(), config, session)
    }

    pub fn with_http(http: reqwest::Client, config: ClientConfig, session: Arc<Session>) -> Self {
        let mut config = config;
        config.backend_url = config.backend_url.trim_end_matches('/').to_string();
        Self {
            http,
            config: Arc::new(config),
            session,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.config.backend_url
    }

    fn credential(&self) -> Credential {
        if let Some(token) = self.session.access_token() {
            return Credential::Bearer(token);
        }
        match &self.config.dev_fallback {
            Some(dev) => Credential::Basic(dev.authorization_header()),
            None => Credential::Anonymous,
        }
    }

    async fn dispatch(&self, req: &ApiRequest, cred: &Credential) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.config.backend_url, req.path);
        debug!(method = %req.method, url = %url, "backend request");
        let mut builder = self.http.request(req.method.clone(), &url);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        if let Some(header) = cred.header() {
            builder = builder.header(AUTHORIZATION, header);
        }
        Ok(builder.send().await?)
    }

    /// Send a request and return the successful response.
    ///
    /// A 401 on an authenticated request triggers exactly one refresh and one
    /// replay. If the refresh is rejected the session is cleared and
    /// [`ApiError::SessionExpired`] is returned. Any other refresh failure
    /// leaves the session alone and returns that error. A 401 on the replay
    /// is returned as-is.
    pub async fn send(&self, req: &ApiRequest) -> Result<Response, ApiError> {
        let cred = if req.authenticated {
            self.credential()
        } else {
            Credential::Anonymous
        };
        let resp = self.dispatch(req, &cred).await?;
        if resp.status() != StatusCode::UNAUTHORIZED || !req.authenticated {
            return check(resp).await;
        }

        let sent_token = match &cred {
            Credential::Bearer(t) => Some(t.as_str()),
            _ => None,
        };
        let access = self.refresh_after_unauthorized(sent_token).await?;
        info!(path = %req.path, "replaying request with refreshed token");
        let retried = self.dispatch(req, &Credential::Bearer(access)).await?;
        check(retried).await
    }

    /// [`send`](Self::send) with the read retry policy applied to transient
    /// failures. Only for idempotent requests.
    pub async fn send_with_retry(&self, req: &ApiRequest) -> Result<Response, ApiError> {
        retry(&self.config.retry, &req.path, || self.send(req)).await
    }

    /// Send and decode a JSON body.
    pub async fn fetch<T: DeserializeOwned>(&self, req: &ApiRequest) -> Result<T, ApiError> {
        let resp = if req.method == Method::GET {
            self.send_with_retry(req).await?
        } else {
            self.send(req).await?
        };
        decode(resp).await
    }

    async fn refresh_after_unauthorized(
        &self,
        sent_token: Option<&str>,
    ) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        // Another request refreshed while this one was in flight.
        if let Some(current) = self.session.access_token() {
            if sent_token.is_some_and(|sent| sent != current) {
                debug!("access token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        if self.session.refresh_token().is_none() {
            warn!("401 without a refresh token; clearing session");
            self.session.clear();
            return Err(ApiError::Unauthorized {
                message: "not logged in".to_string(),
            });
        }

        match self.refresh().await {
            Ok(access) => Ok(access),
            Err(e) if !e.is_rejection() => {
                warn!(error = %e, "token refresh failed; keeping credentials");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "token refresh rejected; clearing session");
                self.session.clear();
                Err(ApiError::SessionExpired)
            }
        }
    }

    /// Exchange a refresh token for a new access token and store it.
    pub(crate) async fn refresh_with(&self, refresh: &str) -> Result<String, ApiError> {
        let req = ApiRequest::post("/api/auth/refresh/")
            .json(&serde_json::json!({ "refresh": refresh }))?
            .anonymous();
        let resp = self.dispatch(&req, &Credential::Anonymous).await?;
        let body: RefreshResponse = decode(check(resp).await?).await?;
        self.session
            .update_access(&body.access, body.refresh.as_deref())?;
        info!("access token refreshed");
        Ok(body.access)
    }

    /// Call with an explicit bearer token, bypassing the refresh policy.
    pub(crate) async fn fetch_as<T: DeserializeOwned>(
        &self,
        req: &ApiRequest,
        access: &str,
    ) -> Result<T, ApiError> {
        let resp = self
            .dispatch(req, &Credential::Bearer(access.to_string()))
            .await?;
        decode(check(resp).await?).await
    }
}

/// Turn a non-2xx response into an [`ApiError`].
pub async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::from_response(status.as_u16(), body))
}

pub async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
