//! Request forwarding to the backend.

use std::time::Instant;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{info, warn};

use crate::AppState;

const OCTET_STREAM: &str = "application/octet-stream";
const ATTACHMENT: &str = "attachment";

/// How the backend response body is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Json,
    Download,
}

pub(crate) async fn api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(&state, method, &uri, &headers, body, Payload::Json).await
}

pub(crate) async fn export_report(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(&state, method, &uri, &headers, body, Payload::Download).await
}

pub(crate) async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub(crate) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// The `Authorization` value to send upstream: the caller's own header,
/// else the dev credential, else none.
pub(crate) fn upstream_authorization(state: &AppState, headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    state
        .config
        .dev_fallback
        .as_ref()
        .map(|dev| dev.authorization_header())
}

async fn forward(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
    payload: Payload,
) -> Response {
    let started = Instant::now();
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = format!("{}{}", state.config.backend_url, path_and_query);

    let mut upstream = state.http.request(method.clone(), &url);
    if let Some(auth) = upstream_authorization(state, headers) {
        upstream = upstream.header(AUTHORIZATION, auth);
    }
    if let Some(ct) = headers.get(CONTENT_TYPE) {
        upstream = upstream.header(CONTENT_TYPE, ct.clone());
    }
    if !body.is_empty() {
        upstream = upstream.body(body);
    }

    let resp = match upstream.send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(method = %method, url = %url, error = %e, "backend unreachable");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("backend unreachable: {e}") })),
            )
                .into_response();
        }
    };

    let status = resp.status();
    let content_type = resp.headers().get(CONTENT_TYPE).cloned();
    let disposition = resp.headers().get(CONTENT_DISPOSITION).cloned();
    let bytes = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!(method = %method, url = %url, error = %e, "backend response truncated");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("backend response failed: {e}") })),
            )
                .into_response();
        }
    };

    info!(
        method = %method,
        path = %uri.path(),
        status = status.as_u16(),
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proxied"
    );

    let mut out = Response::builder().status(status);
    match payload {
        Payload::Download if status.is_success() => {
            out = out
                .header(
                    CONTENT_TYPE,
                    content_type.unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM)),
                )
                .header(
                    CONTENT_DISPOSITION,
                    disposition.unwrap_or_else(|| HeaderValue::from_static(ATTACHMENT)),
                );
        }
        _ => {
            if let Some(ct) = content_type {
                out = out.header(CONTENT_TYPE, ct);
            }
        }
    }
    out.body(Body::from(bytes)).unwrap_or_else(|e| {
        warn!(error = %e, "could not build proxied response");
        StatusCode::BAD_GATEWAY.into_response()
    })
}

/// Permissive CORS headers on every response.
pub(crate) async fn cors(mut resp: Response) -> Response {
    let headers = resp.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    resp
}
