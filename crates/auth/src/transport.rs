//! HTTP transport to the identity service
//!
//! All identity-service calls authenticate with the service's client id and
//! secret over HTTP Basic. The transport is a trait so the client logic can
//! be exercised against a mock without a network.

use async_trait::async_trait;
use serde_json::Value;
use shared::{Error, Result};
use std::time::Duration;

/// Outbound HTTP timeout for identity calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Request body shapes used against the identity service
#[derive(Debug, Clone)]
pub enum AuthBody {
    Empty,
    /// application/x-www-form-urlencoded (token grants, introspection)
    Form(Vec<(String, String)>),
    /// application/json (scope management)
    Json(Value),
}

/// One request against the identity service
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: AuthBody,
    /// Basic-auth username override; the configured client id otherwise
    pub client_id_override: Option<String>,
}

/// Transport seam for the identity client
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Perform the request and return the parsed JSON response.
    async fn send(&self, request: AuthRequest) -> Result<Value>;
}

/// reqwest-backed transport sharing the process connection pool
pub struct ReqwestAuthTransport {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl ReqwestAuthTransport {
    pub fn new(http: reqwest::Client, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

#[async_trait]
impl AuthTransport for ReqwestAuthTransport {
    async fn send(&self, request: AuthRequest) -> Result<Value> {
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url),
            HttpMethod::Post => self.http.post(&request.url),
        };

        let username = request
            .client_id_override
            .as_deref()
            .unwrap_or(&self.client_id);
        builder = builder
            .basic_auth(username, Some(&self.client_secret))
            .timeout(REQUEST_TIMEOUT);

        builder = match &request.body {
            AuthBody::Empty => builder,
            AuthBody::Form(fields) => builder.form(fields),
            AuthBody::Json(value) => builder.json(value),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Identity service request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                url = %request.url,
                status = %status,
                body = %text,
                "Identity service returned an error"
            );
            return Err(Error::upstream(format!(
                "Identity service returned {}: {}",
                status, text
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse identity response: {}", e)))
    }
}
