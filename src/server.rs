//!
//! cattrack HTTP server
//! --------------------
//! Axum front end for the operation dispatcher.
//!
//! Responsibilities:
//! - Resolve the caller identity from `Authorization: Bearer <token>`.
//! - Derive the caller origin and request id for rate limiting and logs.
//! - Decode `{"operation", "arguments"}` bodies into typed operations.
//! - Render results and classified errors in a GraphQL-shaped envelope.
//! - Run the rate-limit window sweeper in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::dispatch::{Dispatcher, Operation};
use crate::error::AppError;
use crate::identity::{HttpIdentityProvider, IdentityResolver, RequestContext};
use crate::rate_limit::RateLimiter;
use crate::storage::MemoryCatStore;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<IdentityResolver>,
    pub dispatcher: Arc<Dispatcher>,
    /// Take the caller origin from `x-forwarded-for` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(resolver: IdentityResolver, dispatcher: Dispatcher) -> Self {
        Self { resolver: Arc::new(resolver), dispatcher: Arc::new(dispatcher), trust_forwarded_for: false }
    }
}

#[derive(Debug, Deserialize)]
struct OperationPayload {
    operation: String,
    #[serde(default)]
    arguments: Value,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "cattrack ok" }))
        .route("/graphql", post(operation_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn caller_origin(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(first) = header_str(headers, "x-forwarded-for").and_then(|v| v.split(',').next()) {
            let first = first.trim();
            if !first.is_empty() { return first.to_string(); }
        }
    }
    peer.ip().to_string()
}

fn error_response(err: &AppError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "data": null, "errors": [err.to_graphql()] })))
}

async fn operation_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<OperationPayload>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rej) => return error_response(&AppError::user("bad_request".to_string(), rej.body_text())),
    };
    let identity = state.resolver.resolve(header_str(&headers, "authorization"));
    let mut ctx = RequestContext::new(identity, Some(caller_origin(&headers, peer, state.trust_forwarded_for)));
    if let Some(rid) = header_str(&headers, "x-request-id").filter(|s| !s.is_empty()) {
        ctx = ctx.with_request_id(rid);
    }

    let op = match Operation::parse(&payload.operation, payload.arguments) {
        Ok(op) => op,
        Err(e) => return error_response(&e),
    };
    let name = op.name();
    match state.dispatcher.dispatch(&ctx, op).await {
        Ok(out) => (StatusCode::OK, Json(json!({ "data": { name: out } }))),
        Err(e) => error_response(&e),
    }
}

/// Serve `state` on an already-bound listener until the process is stopped.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn spawn_rate_sweeper(gate: Arc<RateLimiter>, every: std::time::Duration) {
    if every.is_zero() {
        tracing::info!("rate_sweep" = false, "rate-limit window sweep disabled");
        return;
    }
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let removed = gate.sweep(std::time::Instant::now());
            if removed > 0 { tracing::debug!(removed = removed, "rate_sweep"); }
        }
    });
}

/// Start the cattrack HTTP server with the given configuration.
pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(target: "startup", "cattrack starting: {:?}", config);

    let resolver = IdentityResolver::new(config.jwt_secret.clone());
    if !resolver.verifies_signatures() {
        tracing::warn!(target: "startup", "JWT_SECRET not set: bearer token claims are trusted without signature verification");
    }
    let provider = HttpIdentityProvider::new(&config.auth_url, config.upstream_timeout, config.upstream_timeout)?;
    let gate = Arc::new(RateLimiter::new());
    let dispatcher = Dispatcher::new(Arc::new(MemoryCatStore::new()), Arc::new(provider), gate.clone())
        .with_login_window(config.login_window)
        .with_timeout(config.operation_timeout);
    spawn_rate_sweeper(gate, config.rate_sweep_interval);

    let mut state = AppState::new(resolver, dispatcher);
    state.trust_forwarded_for = config.trust_forwarded_for;

    let addr = config.socket_addr();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}
