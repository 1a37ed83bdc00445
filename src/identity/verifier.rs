//! Credential verification
//!
//! Validates identity credentials (signature, issuer, audience, expiry) before the
//! gateway trusts any claim in them. Any failure is an error; nothing here ever
//! downgrades to "allow".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::claims::IdentityClaims;
use crate::error::{AppError, AppResult};

pub const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify the credential and return its claims.
    async fn verify(&self, credential: &str) -> AppResult<IdentityClaims>;
}

fn validation_for(alg: Algorithm, audience: &str) -> AppResult<Validation> {
    if audience.is_empty() {
        return Err(AppError::config("audience_missing", "expected credential audience is not configured"));
    }
    let mut validation = Validation::new(alg);
    validation.set_issuer(&GOOGLE_ISSUERS);
    validation.set_audience(&[audience]);
    validation.validate_exp = true;
    Ok(validation)
}

/// JWKS document
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize)]
struct JwkKey {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    last_refresh: Instant,
}

/// Verifies Google-issued ID tokens against Google's published signing keys.
pub struct GoogleIdTokenVerifier {
    audience: String,
    jwks_uri: String,
    refresh_interval: Duration,
    jwks_cache: RwLock<Option<JwksCache>>,
    http_client: reqwest::Client,
}

impl GoogleIdTokenVerifier {
    pub fn new(audience: impl Into<String>) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::config("http_client", format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(audience, GOOGLE_JWKS_URI, http_client))
    }

    pub fn with_client(audience: impl Into<String>, jwks_uri: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            audience: audience.into(),
            jwks_uri: jwks_uri.into(),
            refresh_interval: Duration::from_secs(3600),
            jwks_cache: RwLock::new(None),
            http_client,
        }
    }

    async fn decoding_key(&self, kid: Option<&str>) -> AppResult<DecodingKey> {
        let needs_refresh = {
            let cache = self.jwks_cache.read().await;
            match &*cache {
                None => true,
                Some(c) => c.last_refresh.elapsed() > self.refresh_interval,
            }
        };
        // Google rotates keys; an unknown kid forces one refresh before giving up.
        let unknown_kid = match (kid, needs_refresh) {
            (Some(kid), false) => self.jwks_cache.read().await.as_ref().map(|c| !c.keys.contains_key(kid)).unwrap_or(true),
            _ => false,
        };
        if needs_refresh || unknown_kid {
            self.refresh_jwks().await?;
        }

        let cache = self.jwks_cache.read().await;
        let cache = cache
            .as_ref()
            .ok_or_else(|| AppError::internal("jwks_empty", "JWKS cache empty after refresh"))?;
        let key = match kid {
            Some(kid) => cache.keys.get(kid).cloned(),
            None => cache.keys.values().next().cloned(),
        };
        key.ok_or_else(|| AppError::verification("unknown_kid", format!("no matching signing key for kid {:?}", kid)))
    }

    async fn refresh_jwks(&self) -> AppResult<()> {
        debug!(target: "hfy_gateway", url = %self.jwks_uri, "Fetching JWKS");
        let response = self.http_client.get(&self.jwks_uri).send().await?;
        if !response.status().is_success() {
            return Err(AppError::upstream("jwks_fetch", format!("JWKS fetch returned HTTP {}", response.status())));
        }
        let jwks: JwksDocument = response.json().await?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                warn!(target: "hfy_gateway", kty = %jwk.kty, "Skipping unsupported JWK type");
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else { continue; };
            let key = DecodingKey::from_rsa_components(n, e)?;
            keys.insert(jwk.kid.unwrap_or_else(|| "default".to_string()), key);
        }
        if keys.is_empty() {
            return Err(AppError::upstream("jwks_empty", "no usable keys found in JWKS"));
        }
        info!(target: "hfy_gateway", key_count = keys.len(), "Refreshed JWKS cache");
        *self.jwks_cache.write().await = Some(JwksCache { keys, last_refresh: Instant::now() });
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, credential: &str) -> AppResult<IdentityClaims> {
        let header = decode_header(credential)?;
        if header.alg != Algorithm::RS256 {
            return Err(AppError::verification("unsupported_alg", format!("unsupported algorithm {:?}", header.alg)));
        }
        let validation = validation_for(Algorithm::RS256, &self.audience)?;
        let key = self.decoding_key(header.kid.as_deref()).await?;
        let data = decode::<IdentityClaims>(credential, &key, &validation)?;
        Ok(data.claims)
    }
}

/// Shared-secret (HS256) verifier for local development and test credentials.
pub struct StaticKeyVerifier {
    audience: String,
    key: DecodingKey,
}

impl StaticKeyVerifier {
    pub fn new(audience: impl Into<String>, secret: &[u8]) -> Self {
        Self { audience: audience.into(), key: DecodingKey::from_secret(secret) }
    }
}

#[async_trait]
impl CredentialVerifier for StaticKeyVerifier {
    async fn verify(&self, credential: &str) -> AppResult<IdentityClaims> {
        let validation = validation_for(Algorithm::HS256, &self.audience)?;
        let data = decode::<IdentityClaims>(credential, &self.key, &validation)?;
        Ok(data.claims)
    }
}
