use std::net::SocketAddr;

use contrax_core::config::normalize_base_url;
use contrax_core::{ClientConfig, ConfigError, DevCredential};
use thiserror::Error;

pub const ENV_PROXY_ADDR: &str = "CONTRAX_PROXY_ADDR";
pub const DEFAULT_PROXY_ADDR: &str = "127.0.0.1:3000";

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid bind address {value:?}: {source}")]
    InvalidAddr {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("proxy I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Backend base URL without a trailing slash.
    pub backend_url: String,
    pub bind: SocketAddr,
    /// Injected as Basic auth when a request carries no `Authorization`.
    pub dev_fallback: Option<DevCredential>,
}

impl ProxyConfig {
    pub fn new(backend_url: &str, bind: SocketAddr) -> Result<Self, ProxyError> {
        Ok(Self {
            backend_url: normalize_base_url(backend_url)?,
            bind,
            dev_fallback: None,
        })
    }

    pub fn with_dev_fallback(mut self, credential: Option<DevCredential>) -> Self {
        self.dev_fallback = credential;
        self
    }

    pub fn from_env() -> Result<Self, ProxyError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProxyError> {
        let client = ClientConfig::from_lookup(&lookup)?;
        let bind = parse_addr(lookup(ENV_PROXY_ADDR).as_deref().unwrap_or(DEFAULT_PROXY_ADDR))?;
        Ok(Self {
            backend_url: client.backend_url,
            bind,
            dev_fallback: client.dev_fallback,
        })
    }
}

pub fn parse_addr(value: &str) -> Result<SocketAddr, ProxyError> {
    value.parse().map_err(|source| ProxyError::InvalidAddr {
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.backend_url, "http://localhost:8000");
        assert_eq!(cfg.bind.to_string(), DEFAULT_PROXY_ADDR);
        assert!(cfg.dev_fallback.is_none());
    }

    #[test]
    fn fallback_requires_opt_in() {
        let off = ProxyConfig::from_lookup(lookup(&[
            ("CONTRAX_DEV_USERNAME", "admin"),
            ("CONTRAX_DEV_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert!(off.dev_fallback.is_none());

        let on = ProxyConfig::from_lookup(lookup(&[
            ("CONTRAX_DEV_FALLBACK", "1"),
            ("CONTRAX_DEV_USERNAME", "admin"),
            ("CONTRAX_DEV_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(on.dev_fallback.unwrap().username, "admin");
    }

    #[test]
    fn bad_addr_is_rejected() {
        let err = ProxyConfig::from_lookup(lookup(&[(ENV_PROXY_ADDR, "nowhere")])).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidAddr { .. }));
    }
}
