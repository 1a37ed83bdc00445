//! The allowlist check: verify the identity credential, test the keyed e-mail
//! digest against the published allowlist, and mint a session on success.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::cors::cors_headers;
use super::session::{mint_session, SessionGrant};
use crate::allowlist::{
    email_digest, normalize_email, AllowlistStore, CachedAllowlist, FileAllowlistStore,
};
use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{
    redact_email, CredentialVerifier, GoogleIdTokenVerifier, StaticKeyVerifier,
};

/// Transport-neutral view of an incoming request.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub method: String,
    pub origin: Option<String>,
    pub path: String,
    pub request_id: Option<String>,
    pub body: Option<String>,
}

impl GatewayRequest {
    pub fn post(body: impl Into<String>) -> Self {
        Self { method: "POST".into(), body: Some(body.into()), ..Default::default() }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` for the empty preflight body.
    pub body: Option<Value>,
}

impl GatewayResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn allowed(&self) -> bool {
        self.body.as_ref().and_then(|b| b.get("allowed")).and_then(Value::as_bool).unwrap_or(false)
    }
}

enum Decision {
    Allowed { gramps_id: String, grant: SessionGrant },
    Denied,
}

pub struct SessionGateway {
    allowed_origins: Vec<String>,
    session_ttl_secs: u64,
    verifier: Arc<dyn CredentialVerifier>,
    allowlist: CachedAllowlist,
}

impl SessionGateway {
    pub fn new(config: &GatewayConfig, verifier: Arc<dyn CredentialVerifier>, store: Arc<dyn AllowlistStore>) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            session_ttl_secs: config.session_ttl_secs,
            verifier,
            allowlist: CachedAllowlist::new(store),
        }
    }

    /// Wire the deployed collaborators: Google JWKS verification (or the HS256
    /// development key when configured) over file-backed allowlist data.
    pub fn from_config(config: &GatewayConfig) -> AppResult<Self> {
        let verifier: Arc<dyn CredentialVerifier> = match &config.dev_verifier_secret {
            Some(secret) => {
                warn!(target: "hfy_gateway", "Using static development key for credential verification");
                Arc::new(StaticKeyVerifier::new(config.audience.clone(), secret.as_bytes()))
            }
            None => Arc::new(GoogleIdTokenVerifier::new(config.audience.clone())?),
        };
        let store = Arc::new(FileAllowlistStore::new(
            config.hashes_path.clone(),
            config.mapping_path.clone(),
            config.secret.clone(),
        ));
        Ok(Self::new(config, verifier, store))
    }

    pub async fn check_allowed(&self, req: GatewayRequest) -> GatewayResponse {
        let origin = req.origin.as_deref().unwrap_or("");
        let cors = cors_headers(&self.allowed_origins, origin);
        let method = req.method.to_ascii_uppercase();
        let request_id = req.request_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        info!(target: "hfy_gateway", request_id = %request_id, method = %method, origin = %origin, path = %req.path, "Incoming request");

        if method == "OPTIONS" {
            info!(target: "hfy_gateway", request_id = %request_id, "Responding to CORS preflight");
            return GatewayResponse { status: 204, headers: cors, body: None };
        }
        if method != "POST" {
            warn!(target: "hfy_gateway", request_id = %request_id, method = %method, "Method not allowed");
            let err = AppError::method_not_allowed("method_not_allowed", "method not allowed");
            return json_response(err.http_status(), cors, json!({"allowed": false, "error": err.message()}));
        }

        match self.evaluate(req.body.as_deref(), &request_id).await {
            Ok(Decision::Allowed { gramps_id, grant }) => json_response(200, cors, json!({
                "allowed": true,
                "grampsId": gramps_id,
                "sessionToken": grant.session_token,
                "issuedAt": grant.issued_at,
                "expiresAt": grant.expires_at,
                "expiresIn": grant.expires_in,
            })),
            Ok(Decision::Denied) => json_response(403, cors, json!({"allowed": false})),
            Err(e) if e.is_client_facing() => {
                json_response(e.http_status(), cors, json!({"allowed": false, "error": e.message()}))
            }
            Err(e) => {
                error!(target: "hfy_gateway", request_id = %request_id, code = e.code_str(), detail = e.message(), "Error verifying request");
                json_response(500, cors, json!({"allowed": false, "error": "server error"}))
            }
        }
    }

    async fn evaluate(&self, body: Option<&str>, request_id: &str) -> AppResult<Decision> {
        let raw = body.filter(|b| !b.trim().is_empty()).unwrap_or("{}");
        let body: Value = serde_json::from_str(raw)?;
        let Some(credential) = credential_field(&body) else {
            warn!(target: "hfy_gateway", request_id = %request_id, "Missing id_token");
            return Err(AppError::user("missing_id_token", "missing id_token"));
        };

        let claims = self.verifier.verify(credential).await?;
        let email = normalize_email(claims.email());
        if email.is_empty() || !claims.is_email_verified() {
            warn!(target: "hfy_gateway", request_id = %request_id, email_preview = %redact_email(&email), "Email not verified or missing");
            return Err(AppError::forbidden("unverified_email", "unverified email"));
        }

        let (hashes, mapping, secret) = tokio::try_join!(
            self.allowlist.hashes(),
            self.allowlist.mapping(),
            self.allowlist.secret(),
        )?;
        let digest = email_digest(secret, &email)?;
        let gramps_id = mapping.get(&email);
        let (true, Some(gramps_id)) = (hashes.contains(&digest), gramps_id) else {
            warn!(target: "hfy_gateway", request_id = %request_id, email_preview = %redact_email(&email),
                has_mapping = gramps_id.is_some(), "Email not on allowlist or missing record id");
            return Ok(Decision::Denied);
        };

        let grant = mint_session(self.session_ttl_secs)?;
        info!(target: "hfy_gateway", request_id = %request_id, email_preview = %redact_email(&email),
            grampsId = %gramps_id, expires_at = %grant.expires_at, "Allowlist match");
        Ok(Decision::Allowed { gramps_id: gramps_id.clone(), grant })
    }
}

fn credential_field(body: &Value) -> Option<&str> {
    ["id_token", "token"]
        .iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn json_response(status: u16, cors: Vec<(String, String)>, body: Value) -> GatewayResponse {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    headers.extend(cors);
    GatewayResponse { status, headers, body: Some(body) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_field_prefers_id_token_and_skips_empties() {
        assert_eq!(credential_field(&json!({"id_token": "a", "token": "b"})), Some("a"));
        assert_eq!(credential_field(&json!({"id_token": "", "token": "b"})), Some("b"));
        assert_eq!(credential_field(&json!({"id_token": 5})), None);
        assert_eq!(credential_field(&json!({})), None);
    }

    #[test]
    fn json_responses_carry_content_type_and_cors() {
        let r = json_response(403, cors_headers(&[], ""), json!({"allowed": false}));
        assert_eq!(r.header("content-type"), Some("application/json"));
        assert_eq!(r.header("Access-Control-Allow-Origin"), Some("*"));
        assert!(!r.allowed());
    }
}
