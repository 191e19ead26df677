//! Client configuration, resolved from the environment.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::warn;

use crate::poll::POLL_INTERVAL;
use crate::risk::{RiskError, RiskScale};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

pub const ENV_BACKEND_URL: &str = "NEXT_PUBLIC_BACKEND_URL";
pub const ENV_DEV_FALLBACK: &str = "CONTRAX_DEV_FALLBACK";
pub const ENV_DEV_USERNAME: &str = "CONTRAX_DEV_USERNAME";
pub const ENV_DEV_PASSWORD: &str = "CONTRAX_DEV_PASSWORD";
pub const ENV_RISK_SCALE: &str = "CONTRAX_RISK_SCALE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend URL must start with http:// or https://: {0}")]
    InvalidBackendUrl(String),

    #[error("{ENV_DEV_FALLBACK} is set but {0} is missing")]
    IncompleteDevCredential(&'static str),

    #[error(transparent)]
    RiskScale(#[from] RiskError),
}

/// Fixed Basic-Auth credential used when no bearer token is available.
///
/// Development only. Never constructed unless explicitly configured.
#[derive(Clone, PartialEq, Eq)]
pub struct DevCredential {
    pub username: String,
    pub password: String,
}

impl DevCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for DevCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Retry schedule for idempotent reads that fail transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without trailing slash.
    pub backend_url: String,
    pub dev_fallback: Option<DevCredential>,
    pub risk_scale: RiskScale,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            dev_fallback: None,
            risk_scale: RiskScale::default(),
            retry: RetryPolicy::default(),
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn new(backend_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            backend_url: normalize_base_url(backend_url)?,
            ..Self::default()
        })
    }

    pub fn with_dev_fallback(mut self, credential: Option<DevCredential>) -> Self {
        self.dev_fallback = credential;
        self
    }

    /// Resolve from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_url = lookup(ENV_BACKEND_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let risk_scale = match lookup(ENV_RISK_SCALE) {
            Some(v) => v.parse()?,
            None => RiskScale::default(),
        };
        let dev_fallback = dev_credential_from_lookup(&lookup)?;
        Ok(Self {
            backend_url: normalize_base_url(&backend_url)?,
            dev_fallback,
            risk_scale,
            ..Self::default()
        })
    }
}

/// Read the dev credential, gated by `CONTRAX_DEV_FALLBACK`.
pub fn dev_credential_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<DevCredential>, ConfigError> {
    let enabled = lookup(ENV_DEV_FALLBACK).is_some_and(|v| parse_flag(&v));
    if !enabled {
        return Ok(None);
    }
    let username = lookup(ENV_DEV_USERNAME).ok_or(ConfigError::IncompleteDevCredential(
        ENV_DEV_USERNAME,
    ))?;
    let password = lookup(ENV_DEV_PASSWORD).ok_or(ConfigError::IncompleteDevCredential(
        ENV_DEV_PASSWORD,
    ))?;
    warn!(username = %username, "dev Basic-Auth fallback enabled");
    Ok(Some(DevCredential { username, password }))
}

pub fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Validate scheme and strip trailing slashes.
pub fn normalize_base_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidBackendUrl(url.to_string()));
    }
    Ok(url.trim_end_matches('/').to_string())
}
