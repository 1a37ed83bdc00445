//! Session header for gated static assets.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::auth::AuthController;
use super::flags::FeatureFlags;
use super::transport::TransportResponse;
use crate::error::{AppError, AppResult};

pub const SESSION_HEADER: &str = "X-HFY-Session";

/// Headers to attach to a gated asset request.
///
/// Without enforcement the token is sent only if one is cached. With
/// enforcement a missing token triggers verification with `latest_credential`,
/// and it is an error if there is still no token afterwards.
pub async fn session_headers(
    flags: &Arc<FeatureFlags>,
    latest_credential: Option<&str>,
) -> AppResult<Vec<(String, String)>> {
    let header = |t: String| vec![(SESSION_HEADER.to_string(), t)];
    let existing = flags.require_session_token();
    if !flags.enforce_assets() {
        return Ok(existing.map(header).unwrap_or_default());
    }
    if let Some(token) = existing {
        return Ok(header(token));
    }
    flags.verify_session(latest_credential).await;
    flags
        .require_session_token()
        .map(header)
        .ok_or_else(|| AppError::forbidden("session_required", "unable to obtain session token for gated assets"))
}

/// Fetches gated JSON documents with the session header attached.
pub struct ProtectedAssetClient {
    http: reqwest::Client,
    base_url: String,
    flags: Arc<FeatureFlags>,
    auth: Option<Arc<AuthController>>,
}

impl ProtectedAssetClient {
    pub fn new(base_url: impl Into<String>, flags: Arc<FeatureFlags>, auth: Option<Arc<AuthController>>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::config("http_client", format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http, base_url: base_url.into(), flags, auth })
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// GET `path` with the session header; the body is parsed only on a 2xx.
    pub async fn get_json(&self, path: &str) -> AppResult<TransportResponse> {
        let credential = self.auth.as_ref().and_then(|a| a.latest_id_token());
        let headers = session_headers(&self.flags, credential.as_deref()).await?;
        let mut req = self.http.get(self.url_for(path));
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Ok(TransportResponse { status, body: Value::Null });
        }
        Ok(TransportResponse { status, body: resp.json::<Value>().await? })
    }

    pub async fn fetch_json(&self, path: &str) -> AppResult<Value> {
        let resp = self.get_json(path).await?;
        if !resp.is_success() {
            let url = self.url_for(path);
            return Err(AppError::upstream("asset_fetch", format!("{} returned HTTP {}", url, resp.status)));
        }
        Ok(resp.body)
    }
}
