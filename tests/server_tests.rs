//! HTTP front-end tests: the axum router in front of the session gateway.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use hfy_gate::allowlist::{email_digest, MemoryAllowlistStore};
use hfy_gate::config::{GatewayConfig, DEFAULT_GATEWAY_ROUTE};
use hfy_gate::gateway::SessionGateway;
use hfy_gate::identity::StaticKeyVerifier;
use hfy_gate::server::{build_router, AppState};

const AUDIENCE: &str = "server-test-client";
const SIGNING_KEY: &[u8] = b"server-test-key";
const SITE: &str = "https://harrisonfamily.us";

fn router() -> axum::Router {
    let mut mapping = HashMap::new();
    mapping.insert("alice@example.com".to_string(), "I0111".to_string());
    let store = Arc::new(MemoryAllowlistStore::new(vec![email_digest("s3cret", "alice@example.com").unwrap()], mapping, "s3cret"));
    let cfg = GatewayConfig { audience: AUDIENCE.into(), allowed_origins: vec![SITE.into()], ..Default::default() };
    let gateway = SessionGateway::new(&cfg, Arc::new(StaticKeyVerifier::new(AUDIENCE, SIGNING_KEY)), store);
    build_router(AppState { gateway: Arc::new(gateway) }, DEFAULT_GATEWAY_ROUTE)
}

fn credential(email: &str) -> String {
    let claims = json!({
        "iss": "https://accounts.google.com",
        "aud": AUDIENCE,
        "exp": chrono::Utc::now().timestamp() + 600,
        "email": email,
        "email_verified": true,
    });
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SIGNING_KEY)).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_route_answers() {
    let resp = router().oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hfy gateway ok");
}

#[tokio::test]
async fn preflight_gets_cors_headers_and_no_body() {
    let req = Request::builder()
        .method("OPTIONS")
        .uri(DEFAULT_GATEWAY_ROUTE)
        .header("origin", SITE)
        .body(Body::empty())
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()["access-control-allow-origin"], SITE);
    assert_eq!(resp.headers()["access-control-allow-headers"], "Content-Type");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn allowed_post_returns_a_session() {
    let req = Request::post(DEFAULT_GATEWAY_ROUTE)
        .header("content-type", "application/json")
        .header("origin", SITE)
        .header("x-request-id", "req-1")
        .body(Body::from(json!({"id_token": credential("alice@example.com")}).to_string()))
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(resp.headers()["vary"], "Origin");
    let body = json_body(resp).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["grampsId"], "I0111");
}

#[tokio::test]
async fn denied_post_is_403() {
    let req = Request::post(DEFAULT_GATEWAY_ROUTE)
        .body(Body::from(json!({"id_token": credential("mallory@example.com")}).to_string()))
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await, json!({"allowed": false}));
}

#[tokio::test]
async fn other_methods_are_405() {
    let req = Request::builder().method("PUT").uri(DEFAULT_GATEWAY_ROUTE).body(Body::empty()).unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers()["access-control-allow-origin"], SITE);
    assert_eq!(json_body(resp).await["error"], "method not allowed");
}
