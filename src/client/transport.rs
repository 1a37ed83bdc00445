use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Body POSTed to the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How the session layer reaches the gateway.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn post(&self, endpoint: &str, request: &VerifyRequest) -> AppResult<TransportResponse>;
}

/// reqwest-backed transport; keeps a cookie jar so credentialed requests carry cookies.
pub struct HttpGatewayTransport {
    client: reqwest::Client,
}

impl HttpGatewayTransport {
    pub fn new() -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::config("http_client", format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GatewayTransport for HttpGatewayTransport {
    async fn post(&self, endpoint: &str, request: &VerifyRequest) -> AppResult<TransportResponse> {
        let resp = self.client.post(endpoint).json(request).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        // error statuses may carry no JSON at all
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(TransportResponse { status, body })
    }
}
