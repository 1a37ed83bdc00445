//! Session gateway integration tests: allowlist decisions, session minting,
//! CORS handling and fail-closed error paths.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::DateTime;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use hfy_gate::allowlist::{email_digest, MemoryAllowlistStore};
use hfy_gate::config::GatewayConfig;
use hfy_gate::gateway::{GatewayRequest, GatewayResponse, SessionGateway};
use hfy_gate::identity::StaticKeyVerifier;

const AUDIENCE: &str = "test-client.apps.example";
const SIGNING_KEY: &[u8] = b"gateway-test-signing-key";
const HMAC_SECRET: &str = "allowlist-secret";
const SITE: &str = "https://harrisonfamily.us";

fn credential(email: &str, verified: Value) -> String {
    let claims = json!({
        "iss": "https://accounts.google.com",
        "aud": AUDIENCE,
        "exp": chrono::Utc::now().timestamp() + 600,
        "email": email,
        "email_verified": verified,
    });
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SIGNING_KEY)).unwrap()
}

fn gateway(allowlisted: &[&str], mapping: &[(&str, &str)]) -> (SessionGateway, Arc<MemoryAllowlistStore>) {
    let hashes = allowlisted.iter().map(|e| email_digest(HMAC_SECRET, e).unwrap()).collect();
    let mapping: HashMap<String, String> = mapping.iter().map(|(e, id)| (e.to_string(), id.to_string())).collect();
    let store = Arc::new(MemoryAllowlistStore::new(hashes, mapping, HMAC_SECRET));
    let cfg = GatewayConfig {
        audience: AUDIENCE.to_string(),
        allowed_origins: vec![SITE.to_string()],
        ..Default::default()
    };
    let verifier = Arc::new(StaticKeyVerifier::new(AUDIENCE, SIGNING_KEY));
    (SessionGateway::new(&cfg, verifier, store.clone()), store)
}

fn post_token(token: &str) -> GatewayRequest {
    GatewayRequest::post(json!({"id_token": token, "context": "site"}).to_string()).with_origin(SITE)
}

fn body(resp: &GatewayResponse) -> &Value {
    resp.body.as_ref().expect("json body")
}

#[tokio::test]
async fn allowlisted_and_mapped_email_gets_a_session() {
    let (gw, _) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    let resp = gw.check_allowed(post_token(&credential("Alice@Example.com ", json!(true)))).await;
    assert_eq!(resp.status, 200);
    let b = body(&resp);
    assert_eq!(b["allowed"], true);
    assert_eq!(b["grampsId"], "I0111");
    assert_eq!(b["expiresIn"], 900);
    assert!(b["sessionToken"].as_str().unwrap().len() >= 43);
    assert_eq!(resp.header("Content-Type"), Some("application/json"));
}

#[tokio::test]
async fn email_missing_from_hash_set_is_denied_even_when_mapped() {
    let (gw, _) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111"), ("bob@example.com", "I0200")]);
    let resp = gw.check_allowed(post_token(&credential("bob@example.com", json!(true)))).await;
    assert_eq!(resp.status, 403);
    assert_eq!(body(&resp), &json!({"allowed": false}));
}

#[tokio::test]
async fn hashed_but_unmapped_email_is_denied() {
    let (gw, _) = gateway(&["carol@example.com"], &[]);
    let resp = gw.check_allowed(post_token(&credential("carol@example.com", json!(true)))).await;
    assert_eq!(resp.status, 403);
    assert_eq!(body(&resp), &json!({"allowed": false}));
}

#[tokio::test]
async fn repeated_requests_mint_distinct_tokens() {
    let (gw, _) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    let cred = credential("alice@example.com", json!(true));
    let a = gw.check_allowed(post_token(&cred)).await;
    let b = gw.check_allowed(post_token(&cred)).await;
    assert_eq!(a.status, 200);
    assert_eq!(b.status, 200);
    assert_ne!(body(&a)["sessionToken"], body(&b)["sessionToken"]);
}

#[tokio::test]
async fn expiry_is_issued_at_plus_ttl() {
    let (gw, _) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    let resp = gw.check_allowed(post_token(&credential("alice@example.com", json!(true)))).await;
    let b = body(&resp);
    let issued = DateTime::parse_from_rfc3339(b["issuedAt"].as_str().unwrap()).unwrap();
    let expires = DateTime::parse_from_rfc3339(b["expiresAt"].as_str().unwrap()).unwrap();
    let delta = (expires - issued).num_milliseconds();
    assert!((899_000..=901_000).contains(&delta), "delta {delta}");
    assert!(b["issuedAt"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn foreign_origin_never_echoed() {
    let (gw, _) = gateway(&[], &[]);
    let mut req = post_token("x");
    req.origin = Some("https://evil.example".into());
    let resp = gw.check_allowed(req).await;
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some(SITE));

    let preflight = GatewayRequest { method: "OPTIONS".into(), origin: Some("https://evil.example".into()), ..Default::default() };
    let resp = gw.check_allowed(preflight).await;
    assert_eq!(resp.status, 204);
    assert!(resp.body.is_none());
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some(SITE));
    assert_eq!(resp.header("Access-Control-Allow-Methods"), Some("POST,OPTIONS"));
    assert_eq!(resp.header("Vary"), Some("Origin"));
}

#[tokio::test]
async fn configured_origin_is_echoed() {
    let (gw, _) = gateway(&[], &[]);
    let resp = gw.check_allowed(GatewayRequest { method: "options".into(), origin: Some(SITE.into()), ..Default::default() }).await;
    assert_eq!(resp.status, 204);
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some(SITE));
}

#[tokio::test]
async fn other_methods_get_405() {
    let (gw, _) = gateway(&[], &[]);
    let resp = gw.check_allowed(GatewayRequest { method: "GET".into(), ..Default::default() }).await;
    assert_eq!(resp.status, 405);
    assert_eq!(body(&resp), &json!({"allowed": false, "error": "method not allowed"}));
}

#[tokio::test]
async fn missing_credential_is_400() {
    let (gw, _) = gateway(&[], &[]);
    for raw in [r#"{"context":"site"}"#, r#"{"id_token":""}"#, ""] {
        let resp = gw.check_allowed(GatewayRequest::post(raw)).await;
        assert_eq!(resp.status, 400, "body {raw:?}");
        assert_eq!(body(&resp), &json!({"allowed": false, "error": "missing id_token"}));
    }
}

#[tokio::test]
async fn legacy_token_field_is_accepted() {
    let (gw, _) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    let req = GatewayRequest::post(json!({"token": credential("alice@example.com", json!(true))}).to_string());
    assert_eq!(gw.check_allowed(req).await.status, 200);
}

#[tokio::test]
async fn unverified_or_missing_email_is_403_with_reason() {
    let (gw, _) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    for verified in [json!(false), json!("true"), Value::Null] {
        let resp = gw.check_allowed(post_token(&credential("alice@example.com", verified.clone()))).await;
        assert_eq!(resp.status, 403, "email_verified {verified}");
        assert_eq!(body(&resp), &json!({"allowed": false, "error": "unverified email"}));
    }
    let resp = gw.check_allowed(post_token(&credential("", json!(true)))).await;
    assert_eq!(resp.status, 403);
}

#[tokio::test]
async fn verification_failures_fail_closed() {
    let (gw, store) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    let resp = gw.check_allowed(post_token("not-a-jwt")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(body(&resp), &json!({"allowed": false, "error": "server error"}));

    let wrong_key = encode(
        &Header::new(Algorithm::HS256),
        &json!({"iss": "accounts.google.com", "aud": AUDIENCE, "exp": chrono::Utc::now().timestamp() + 600,
                "email": "alice@example.com", "email_verified": true}),
        &EncodingKey::from_secret(b"someone-else"),
    ).unwrap();
    assert_eq!(gw.check_allowed(post_token(&wrong_key)).await.status, 500);
    // nothing was loaded for rejected credentials
    assert_eq!(store.hash_loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_body_is_a_server_error() {
    let (gw, _) = gateway(&[], &[]);
    let resp = gw.check_allowed(GatewayRequest::post("{not json")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(body(&resp)["error"], "server error");
}

#[tokio::test]
async fn store_outage_is_500_and_recovers_without_restart() {
    let (gw, store) = gateway(&["alice@example.com"], &[("alice@example.com", "I0111")]);
    let cred = credential("alice@example.com", json!(true));
    store.set_failing(true);
    let resp = gw.check_allowed(post_token(&cred)).await;
    assert_eq!(resp.status, 500);
    assert!(!resp.allowed());

    store.set_failing(false);
    assert_eq!(gw.check_allowed(post_token(&cred)).await.status, 200);
    let loads = (
        store.hash_loads.load(Ordering::SeqCst),
        store.mapping_loads.load(Ordering::SeqCst),
        store.secret_loads.load(Ordering::SeqCst),
    );
    for _ in 0..3 {
        assert_eq!(gw.check_allowed(post_token(&cred)).await.status, 200);
    }
    // later requests are served from the memo
    assert_eq!(store.hash_loads.load(Ordering::SeqCst), loads.0);
    assert_eq!(store.mapping_loads.load(Ordering::SeqCst), loads.1);
    assert_eq!(store.secret_loads.load(Ordering::SeqCst), loads.2);
}
