//! Shared fixtures: an in-process identity provider and a cattrack server
//! bound to loopback ports.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use cattrack::dispatch::Dispatcher;
use cattrack::identity::{HttpIdentityProvider, IdentityResolver};
use cattrack::rate_limit::RateLimiter;
use cattrack::server::{serve, AppState};
use cattrack::storage::MemoryCatStore;

pub const SECRET: &str = "integration-secret";
pub const GOOD_TOKEN: &str = "idp-issued-token";
/// Bearer the fake provider always rejects.
pub const REVOKED_TOKEN: &str = "revoked";

#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub route: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// Fake identity service; records every request it answers.
#[derive(Clone, Default)]
pub struct FakeIdp {
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl FakeIdp {
    pub fn routes(&self) -> Vec<String> { self.seen.lock().iter().map(|s| s.route.clone()).collect() }
    pub fn last(&self) -> Option<Seen> { self.seen.lock().last().cloned() }
}

fn user_json(id: &str) -> Value {
    json!({ "_id": id, "user_name": format!("user-{id}"), "email": format!("{id}@cats.test") })
}

fn message(msg: &str, id: &str, token: Option<&str>) -> Value {
    json!({ "message": msg, "token": token, "user": user_json(id) })
}

fn record(idp: &FakeIdp, route: String, headers: &HeaderMap, body: Option<Value>) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    idp.seen.lock().push(Seen { route, bearer: bearer.clone(), body });
    bearer
}

fn require(bearer: Option<String>) -> Result<(), StatusCode> {
    match bearer.as_deref() {
        Some(t) if !t.is_empty() && t != REVOKED_TOKEN => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn list_users(State(idp): State<FakeIdp>, headers: HeaderMap) -> Json<Value> {
    record(&idp, "GET /users".into(), &headers, None);
    Json(json!([user_json("u1"), user_json("u2")]))
}

async fn user_by_id(State(idp): State<FakeIdp>, Path(id): Path<String>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    record(&idp, format!("GET /users/{id}"), &headers, None);
    if id == "missing" { return Err(StatusCode::NOT_FOUND); }
    Ok(Json(user_json(&id)))
}

async fn check_token(State(idp): State<FakeIdp>, Path(id): Path<String>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    require(record(&idp, format!("GET /users/{id}/check"), &headers, None))?;
    Ok(Json(message("token ok", &id, None)))
}

async fn login(State(idp): State<FakeIdp>, headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    record(&idp, "POST /auth/login".into(), &headers, Some(body.clone()));
    if body["password"] != "pw" { return Err(StatusCode::UNAUTHORIZED); }
    let name = body["username"].as_str().unwrap_or_default();
    Ok(Json(message("logged in", name, Some(GOOD_TOKEN))))
}

async fn register(State(idp): State<FakeIdp>, headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    record(&idp, "POST /users".into(), &headers, Some(body.clone()));
    if body["user_name"] == "taken" { return Err(StatusCode::CONFLICT); }
    Ok(Json(message("registered", "new-user", Some(GOOD_TOKEN))))
}

async fn update_user(State(idp): State<FakeIdp>, headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    require(record(&idp, "PUT /users".into(), &headers, Some(body)))?;
    Ok(Json(message("updated", "u1", None)))
}

async fn delete_user(State(idp): State<FakeIdp>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    require(record(&idp, "DELETE /users".into(), &headers, None))?;
    Ok(Json(message("deleted", "u1", None)))
}

async fn delete_user_as_admin(State(idp): State<FakeIdp>, Path(id): Path<String>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    require(record(&idp, format!("DELETE /users/{id}"), &headers, None))?;
    Ok(Json(message("deleted", &id, None)))
}

/// Start the fake identity provider; returns its base URL.
pub async fn spawn_idp() -> anyhow::Result<(String, FakeIdp)> {
    let idp = FakeIdp::default();
    let app = Router::new()
        .route("/users", get(list_users).post(register).put(update_user).delete(delete_user))
        .route("/users/{id}", get(user_by_id).delete(delete_user_as_admin))
        .route("/users/{id}/check", get(check_token))
        .route("/auth/login", post(login))
        .with_state(idp.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });
    Ok((format!("http://{addr}"), idp))
}

pub fn provider(base_url: &str) -> anyhow::Result<HttpIdentityProvider> {
    Ok(HttpIdentityProvider::new(base_url, Duration::from_secs(2), Duration::from_secs(5))?)
}

/// Start cattrack in front of `idp_url` with signature verification on.
pub async fn spawn_api(idp_url: &str) -> anyhow::Result<String> {
    let dispatcher = Dispatcher::new(Arc::new(MemoryCatStore::new()), Arc::new(provider(idp_url)?), Arc::new(RateLimiter::new()))
        .with_timeout(Duration::from_secs(10));
    let state = AppState::new(IdentityResolver::new(Some(SECRET.to_string())), dispatcher);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(serve(listener, state));
    Ok(format!("http://{addr}"))
}

/// Signed bearer token for `id` with `role`.
pub fn token_for(id: &str, role: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    cattrack::identity::sign_hs256(&json!({ "id": id, "role": role, "exp": exp }), SECRET)
}
