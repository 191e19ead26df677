//! In-process stand-in for the analysis backend.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contrax_client::{ApiClient, Session};
use contrax_core::{ClientConfig, ContractStatus, DevCredential};
use contrax_store::{CredentialStore, MemoryStorage};
use serde_json::{Value, json};

pub const PASSWORD: &str = "s3cretpass";
pub const DEV_USER: &str = "dev";
pub const DEV_PASSWORD: &str = "devpass";

#[derive(Default)]
pub struct Hits {
    pub login: AtomicU64,
    pub refresh: AtomicU64,
    pub user: AtomicU64,
    pub logout: AtomicU64,
    pub list: AtomicU64,
    pub detail: AtomicU64,
    pub analyze: AtomicU64,
    pub stats: AtomicU64,
}

impl Hits {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Stored {
    contract: BTreeMap<String, Value>,
    /// Detail reads left before an analyzing contract settles.
    remaining: HashMap<String, u32>,
    settle_to: HashMap<String, ContractStatus>,
}

#[derive(Default)]
pub struct Backend {
    pub hits: Hits,
    access: Mutex<HashSet<String>>,
    refresh: Mutex<HashSet<String>>,
    reject_refresh: Mutex<bool>,
    refresh_down: Mutex<bool>,
    refuse_bearer: Mutex<bool>,
    seq: AtomicU64,
    data: Mutex<Stored>,
    /// Detail reads an analysis takes to settle.
    pub settle_after: Mutex<u32>,
    pub outcome: Mutex<Option<ContractStatus>>,
    /// Last `Authorization` header seen on a contract route.
    pub last_auth: Mutex<Option<String>>,
}

impl Backend {
    fn next(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn issue_pair(&self) -> (String, String) {
        let n = self.next();
        let access = format!("access-{n}");
        let refresh = format!("refresh-{n}");
        self.access.lock().unwrap().insert(access.clone());
        self.refresh.lock().unwrap().insert(refresh.clone());
        (access, refresh)
    }

    /// Invalidate every access token, as if they had all expired.
    pub fn expire_access(&self) {
        self.access.lock().unwrap().clear();
    }

    pub fn reject_refresh(&self) {
        *self.reject_refresh.lock().unwrap() = true;
    }

    /// Answer 503 on the refresh endpoint.
    pub fn refresh_unavailable(&self) {
        *self.refresh_down.lock().unwrap() = true;
    }

    /// Reject every bearer token, including freshly refreshed ones.
    pub fn refuse_bearer(&self) {
        *self.refuse_bearer.lock().unwrap() = true;
    }

    pub fn contract_count(&self) -> usize {
        self.data.lock().unwrap().contract.len()
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let header = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_auth.lock().unwrap() = header.clone();
        let ok = match header.as_deref() {
            Some(h) if h.starts_with("Bearer ") => {
                !*self.refuse_bearer.lock().unwrap()
                    && self.access.lock().unwrap().contains(&h["Bearer ".len()..])
            }
            Some(h) => h == DevCredential::new(DEV_USER, DEV_PASSWORD).authorization_header(),
            None => false,
        };
        if ok {
            Ok(())
        } else {
            Err(error(
                StatusCode::UNAUTHORIZED,
                json!({"detail": "Given token not valid for any token type"}),
            ))
        }
    }
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn user_json() -> Value {
    json!({
        "id": 1,
        "username": "ana",
        "email": "ana@example.com",
        "first_name": "Ana",
        "last_name": "Ruiz",
        "is_active": true,
        "is_staff": false
    })
}

type Shared = State<Arc<Backend>>;

async fn login(State(b): Shared, Json(body): Json<Value>) -> Response {
    b.hits.login.fetch_add(1, Ordering::SeqCst);
    if body["password"] != PASSWORD {
        return error(StatusCode::BAD_REQUEST, json!({"error": "Invalid credentials"}));
    }
    let (access, refresh) = b.issue_pair();
    Json(json!({
        "message": "Login successful",
        "user": user_json(),
        "tokens": {"access": access, "refresh": refresh}
    }))
    .into_response()
}

async fn register(State(b): Shared, Json(body): Json<Value>) -> Response {
    if body["username"] == "taken" {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"username": ["A user with that username already exists."]}),
        );
    }
    let (access, refresh) = b.issue_pair();
    let mut user = user_json();
    user["username"] = body["username"].clone();
    (
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered",
            "user": user,
            "tokens": {"access": access, "refresh": refresh}
        })),
    )
        .into_response()
}

async fn refresh(State(b): Shared, Json(body): Json<Value>) -> Response {
    b.hits.refresh.fetch_add(1, Ordering::SeqCst);
    if *b.refresh_down.lock().unwrap() {
        return error(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"detail": "Service temporarily unavailable"}),
        );
    }
    let token = body["refresh"].as_str().unwrap_or_default().to_string();
    let known = b.refresh.lock().unwrap().contains(&token);
    if !known || *b.reject_refresh.lock().unwrap() {
        return error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        );
    }
    let access = format!("access-{}", b.next());
    b.access.lock().unwrap().insert(access.clone());
    Json(json!({ "access": access })).into_response()
}

async fn current_user(State(b): Shared, headers: HeaderMap) -> Response {
    b.hits.user.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    Json(user_json()).into_response()
}

async fn logout(State(b): Shared, Json(body): Json<Value>) -> Response {
    b.hits.logout.fetch_add(1, Ordering::SeqCst);
    if let Some(token) = body["refresh"].as_str() {
        b.refresh.lock().unwrap().remove(token);
    }
    StatusCode::RESET_CONTENT.into_response()
}

fn summary(c: &Value) -> Value {
    let mut s = c.clone();
    if let Some(obj) = s.as_object_mut() {
        obj.remove("original_text");
    }
    s
}

async fn list_contracts(
    State(b): Shared,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    b.hits.list.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    let data = b.data.lock().unwrap();
    let results: Vec<Value> = data
        .contract
        .values()
        .filter(|c| q.get("status").is_none_or(|s| c["status"] == s.as_str()))
        .map(summary)
        .collect();
    Json(json!({
        "count": results.len(),
        "next": null,
        "previous": null,
        "results": results
    }))
    .into_response()
}

async fn create_contract(
    State(b): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    let text = body["original_text"].as_str().unwrap_or_default();
    if text.chars().count() < 50 {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"original_text": ["Ensure this field has at least 50 characters."]}),
        );
    }
    let id = format!("c{}", b.next());
    let contract = json!({
        "id": id,
        "title": body["title"],
        "contract_type": body["contract_type"],
        "contract_type_name": "Lease",
        "original_text": text,
        "status": "pending",
        "total_clauses": 0,
        "abusive_clauses_count": 0,
        "risk_score": null,
        "created_at": "2026-10-16T09:00:00Z",
        "uploaded_by_username": "ana"
    });
    b.data
        .lock()
        .unwrap()
        .contract
        .insert(id.clone(), contract);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "title": body["title"],
            "original_text": text,
            "contract_type": body["contract_type"]
        })),
    )
        .into_response()
}

async fn get_contract(State(b): Shared, headers: HeaderMap, Path(id): Path<String>) -> Response {
    b.hits.detail.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    let mut guard = b.data.lock().unwrap();
    let data = &mut *guard;
    let Some(contract) = data.contract.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, json!({"detail": "Not found."}));
    };
    if contract["status"] == "analyzing" {
        let left = data.remaining.entry(id.clone()).or_insert(0);
        if *left == 0 {
            let to = data
                .settle_to
                .remove(&id)
                .unwrap_or(ContractStatus::Completed);
            contract["status"] = json!(to.as_str());
            if to == ContractStatus::Completed {
                contract["risk_score"] = json!(0.42);
                contract["total_clauses"] = json!(6);
                contract["abusive_clauses_count"] = json!(2);
            }
        } else {
            *left -= 1;
        }
    }
    Json(contract.clone()).into_response()
}

async fn delete_contract(State(b): Shared, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    match b.data.lock().unwrap().contract.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error(StatusCode::NOT_FOUND, json!({"detail": "Not found."})),
    }
}

async fn analyze(
    State(b): Shared,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    b.hits.analyze.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    let settle_after = *b.settle_after.lock().unwrap();
    let outcome = *b.outcome.lock().unwrap();
    let mut data = b.data.lock().unwrap();
    let Some(contract) = data.contract.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, json!({"detail": "Not found."}));
    };
    let force = body["force_reanalysis"].as_bool().unwrap_or(false);
    if contract["status"] == "completed" && !force {
        return Json(json!({"message": "Contract already analyzed", "status": "completed"}))
            .into_response();
    }
    if contract["status"] == "analyzing" {
        return error(StatusCode::BAD_REQUEST, json!({"error": "Analysis already in progress"}));
    }
    contract["status"] = json!("analyzing");
    data.remaining.insert(id.clone(), settle_after);
    if let Some(to) = outcome {
        data.settle_to.insert(id.clone(), to);
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Analysis started",
            "contract_id": id,
            "task_id": format!("task-{id}"),
            "status": "analyzing"
        })),
    )
        .into_response()
}

async fn dashboard_stats(State(b): Shared, headers: HeaderMap) -> Response {
    b.hits.stats.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    let data = b.data.lock().unwrap();
    let count = |s: &str| data.contract.values().filter(|c| c["status"] == s).count();
    Json(json!({
        "total_contracts": data.contract.len(),
        "pending_analysis": count("pending"),
        "analyzing": count("analyzing"),
        "completed": count("completed"),
        "high_risk": 0,
        "medium_risk": 0,
        "low_risk": 0,
        "recent_contracts": []
    }))
    .into_response()
}

async fn contract_types(State(b): Shared, headers: HeaderMap) -> Response {
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    Json(json!([
        {"id": 1, "name": "Lease", "code": "LEASE", "description": "Residential lease"},
        {"id": 2, "name": "Employment", "code": "EMPLOYMENT", "description": ""}
    ]))
    .into_response()
}

async fn clauses(
    State(b): Shared,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    let contract = q.get("contract").cloned().unwrap_or_default();
    Json(json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{
            "id": format!("{contract}-1"),
            "text": "The tenant waives every right to a refund.",
            "clause_number": 1,
            "ml_analysis": {"is_abusive": true, "abuse_probability": 0.91},
            "gpt_analysis": {
                "is_valid_clause": true,
                "is_abusive": true,
                "explanation": "One-sided waiver."
            },
            "entities": [],
            "risk_score": 0.91
        }]
    }))
    .into_response()
}

pub fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/register/", post(register))
        .route("/api/auth/refresh/", post(refresh))
        .route("/api/auth/user/", get(current_user))
        .route("/api/auth/logout/", post(logout))
        .route("/api/contracts/", get(list_contracts).post(create_contract))
        .route("/api/contracts/dashboard_stats/", get(dashboard_stats))
        .route("/api/contracts/:id/", get(get_contract).delete(delete_contract))
        .route("/api/contracts/:id/analyze/", post(analyze))
        .route("/api/contract-types/", get(contract_types))
        .route("/api/clauses/", get(clauses))
        .with_state(backend)
}

/// Serve a fresh backend on an ephemeral port.
pub async fn spawn_backend() -> (Arc<Backend>, String) {
    let backend = Arc::new(Backend::default());
    let app = router(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (backend, format!("http://{addr}"))
}

pub fn client_for(url: &str) -> ApiClient {
    client_with(ClientConfig::new(url).expect("config"))
}

pub fn client_with(config: ClientConfig) -> ApiClient {
    let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
    ApiClient::new(config, Arc::new(Session::new(store)))
}

pub fn lease_text() -> String {
    let text = "The tenant shall pay rent monthly in advance. The landlord may enter at any \
                time without notice and keep the deposit for any reason whatsoever. No pets allowed.";
    assert_eq!(text.chars().count(), 160);
    text.to_string()
}
