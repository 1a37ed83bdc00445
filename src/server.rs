//!
//! hfy gateway HTTP server
//! -----------------------
//! Axum front-end that exposes the session gateway at a single route.
//!
//! Responsibilities:
//! - Translate HTTP requests into `GatewayRequest` (method, origin, path, request id, body).
//! - Render `GatewayResponse` status, headers and JSON body back to HTTP.
//! - A plain-text health route at `/`.
//! - Startup configuration logs (never secrets).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use tracing::{info, warn};

use crate::config::{GatewayConfig, SecretSource};
use crate::gateway::{GatewayRequest, GatewayResponse, SessionGateway};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SessionGateway>,
}

pub fn build_router(state: AppState, route: &str) -> Router {
    Router::new()
        .route("/", get(|| async { "hfy gateway ok" }))
        .route(route, any(check_allowed))
        .with_state(state)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string()).filter(|s| !s.is_empty())
}

async fn check_allowed(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = GatewayRequest {
        method: method.as_str().to_string(),
        origin: header_str(&headers, "origin"),
        path: uri.path().to_string(),
        request_id: header_str(&headers, "x-request-id").or_else(|| header_str(&headers, "x-amzn-trace-id")),
        body: if body.is_empty() { None } else { Some(String::from_utf8_lossy(&body).into_owned()) },
    };
    into_http(state.gateway.check_allowed(req).await)
}

fn into_http(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    for (k, v) in &resp.headers {
        match (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            (Ok(name), Ok(value)) => { headers.insert(name, value); }
            _ => warn!(target: "hfy_gateway", header = %k, "Dropping unrepresentable response header"),
        }
    }
    match resp.body {
        Some(body) => (status, headers, Json(body)).into_response(),
        None => (status, headers).into_response(),
    }
}

fn log_startup_config(cfg: &GatewayConfig) {
    let secret = match &cfg.secret {
        Some(SecretSource::Value(_)) => "env".to_string(),
        Some(SecretSource::File(p)) => format!("file {}", p.display()),
        None => "unset".to_string(),
    };
    info!(
        target: "startup",
        "hfy gateway starting: route={}, port={}, origins={:?}, ttl_secs={}, hashes={}, mapping={}, secret={}, audience_set={}, dev_verifier={}",
        cfg.route, cfg.http_port, cfg.allowed_origins, cfg.session_ttl_secs,
        cfg.hashes_path.display(), cfg.mapping_path.display(), secret,
        !cfg.audience.is_empty(), cfg.dev_verifier_secret.is_some()
    );
    if cfg.audience.is_empty() {
        warn!(target: "startup", "GOOGLE_CLIENT_ID is not set; every credential will fail verification");
    }
}

/// Start the gateway HTTP server bound to `0.0.0.0:<http_port>`.
pub async fn run_with_config(cfg: GatewayConfig) -> anyhow::Result<()> {
    log_startup_config(&cfg);
    let gateway = SessionGateway::from_config(&cfg).context("While building the session gateway")?;
    let app = build_router(AppState { gateway: Arc::new(gateway) }, &cfg.route);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    info!(target: "startup", "HTTP listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
