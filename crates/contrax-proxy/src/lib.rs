//! Development proxy: forwards the client's `/api/...` calls to the
//! analysis backend, adding the dev Basic credential when configured and the
//! caller sent no `Authorization` header.

pub mod config;
mod forward;

use std::sync::Arc;

use axum::Router;
use axum::middleware::map_response;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

pub use config::{DEFAULT_PROXY_ADDR, ENV_PROXY_ADDR, ProxyConfig, ProxyError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use forward::{api, export_report, healthz, preflight};

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/contracts/",
            get(api).post(api).options(preflight),
        )
        .route(
            "/api/contracts/dashboard_stats/",
            get(api).options(preflight),
        )
        .route(
            "/api/contracts/:id/",
            get(api).delete(api).options(preflight),
        )
        .route(
            "/api/contracts/:id/analyze/",
            post(api).options(preflight),
        )
        .route(
            "/api/contracts/:id/export_report/",
            get(export_report).options(preflight),
        )
        .route("/api/contract-types/", get(api).options(preflight))
        .route("/api/clauses/", get(api).options(preflight))
        .layer(map_response(forward::cors))
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    config: ProxyConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ProxyError> {
    let addr = listener.local_addr()?;
    info!(
        addr = %addr,
        backend = %config.backend_url,
        dev_fallback = config.dev_fallback.is_some(),
        "proxy listening"
    );
    let app = build_router(AppState::new(config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("proxy stopped");
    Ok(())
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(config: ProxyConfig) -> Result<(), ProxyError> {
    let listener = TcpListener::bind(config.bind).await?;
    serve_on(listener, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
