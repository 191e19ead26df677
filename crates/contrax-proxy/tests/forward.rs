use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contrax_core::DevCredential;
use contrax_proxy::{AppState, ProxyConfig, build_router};
use serde_json::{Value, json};

async fn echo(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(json!({ "auth": auth, "query": q }))
}

async fn detail(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    }
    Json(json!({"id": id, "title": "Lease"})).into_response()
}

async fn analyze(Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({"message": "Analysis started", "contract_id": id, "echo": body})),
    )
        .into_response()
}

async fn export(Path(id): Path<String>) -> Response {
    if id == "pdf" {
        return Response::builder()
            .header("content-type", "application/pdf")
            .header("content-disposition", "attachment; filename=\"report.pdf\"")
            .body(Body::from("%PDF-1.4"))
            .unwrap();
    }
    Response::new(Body::from(vec![1u8, 2, 3]))
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    addr
}

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/api/contracts/", get(echo))
        .route("/api/contracts/:id/", get(detail))
        .route("/api/contracts/:id/analyze/", post(analyze))
        .route("/api/contracts/:id/export_report/", get(export));
    spawn(app).await
}

async fn spawn_proxy(backend: &str, dev: Option<DevCredential>) -> String {
    let config = ProxyConfig::new(backend, "127.0.0.1:0".parse().unwrap())
        .expect("config")
        .with_dev_fallback(dev);
    let addr = spawn(build_router(AppState::new(config))).await;
    format!("http://{addr}")
}

#[tokio::test]
async fn forwards_caller_authorization_and_query() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(
        &format!("http://{backend}"),
        Some(DevCredential::new("admin", "pw")),
    )
    .await;

    let body: Value = reqwest::Client::new()
        .get(format!("{proxy}/api/contracts/?status=completed&page=2"))
        .header("authorization", "Bearer tok")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["auth"], "Bearer tok");
    assert_eq!(body["query"]["status"], "completed");
    assert_eq!(body["query"]["page"], "2");
}

#[tokio::test]
async fn injects_dev_credential_only_when_configured() {
    let backend = spawn_backend().await;
    let with = spawn_proxy(
        &format!("http://{backend}"),
        Some(DevCredential::new("admin", "pw")),
    )
    .await;
    let without = spawn_proxy(&format!("http://{backend}"), None).await;

    let body: Value = reqwest::get(format!("{with}/api/contracts/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["auth"],
        DevCredential::new("admin", "pw").authorization_header()
    );

    let body: Value = reqwest::get(format!("{without}/api/contracts/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["auth"].is_null());
}

#[tokio::test]
async fn backend_errors_pass_through() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(&format!("http://{backend}"), None).await;

    let resp = reqwest::get(format!("{proxy}/api/contracts/missing/"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Not found.");
}

#[tokio::test]
async fn post_body_is_forwarded() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(&format!("http://{backend}"), None).await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy}/api/contracts/c1/analyze/"))
        .json(&json!({"force_reanalysis": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["echo"]["force_reanalysis"], true);
}

#[tokio::test]
async fn export_report_headers() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(&format!("http://{backend}"), None).await;

    let resp = reqwest::get(format!("{proxy}/api/contracts/pdf/export_report/?format=pdf"))
        .await
        .unwrap();
    assert_eq!(resp.headers()["content-type"], "application/pdf");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"%PDF-1.4");

    let resp = reqwest::get(format!("{proxy}/api/contracts/raw/export_report/"))
        .await
        .unwrap();
    assert_eq!(resp.headers()["content-type"], "application/octet-stream");
    assert_eq!(resp.headers()["content-disposition"], "attachment");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &[1u8, 2, 3]);
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let dead = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let proxy = spawn_proxy(&format!("http://{dead}"), None).await;

    let resp = reqwest::get(format!("{proxy}/api/contract-types/"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 502);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("backend unreachable"));
}

#[tokio::test]
async fn preflight_and_health() {
    let proxy = spawn_proxy("http://127.0.0.1:9", None).await;
    let client = reqwest::Client::new();

    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{proxy}/api/contracts/c1/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert!(
        resp.headers()["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .contains("Authorization")
    );

    let resp = client.get(format!("{proxy}/healthz")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = client.get(format!("{proxy}/api/users/")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
