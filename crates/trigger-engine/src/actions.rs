//! Action endpoint client
//!
//! Speaks the `run` / `status` / `release` protocol against a trigger's
//! action URL.

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{ActionStatus, Error, Result};
use std::time::Duration;

/// Outbound HTTP timeout for action calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Invocation and lifecycle operations against an action endpoint
#[async_trait]
pub trait ActionClient: Send + Sync {
    /// Start an action. `request_id` is the idempotency key (the event's
    /// message id).
    async fn run(
        &self,
        action_url: &str,
        request_id: &str,
        body: &Value,
        bearer_token: &str,
    ) -> Result<ActionStatus>;

    /// Fetch the current status of an action.
    async fn status(
        &self,
        action_url: &str,
        action_id: &str,
        bearer_token: &str,
    ) -> Result<ActionStatus>;

    /// Release a completed action. Called once per terminal status.
    async fn release(
        &self,
        action_url: &str,
        action_id: &str,
        bearer_token: &str,
    ) -> Result<ActionStatus>;
}

/// HTTP implementation of [`ActionClient`]
pub struct HttpActionClient {
    http: reqwest::Client,
}

impl HttpActionClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn parse_status(response: reqwest::Response, context: &str) -> Result<ActionStatus> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!(
                "Action {} returned {}: {}",
                context, status, text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse action {} response: {}", context, e)))
    }
}

#[async_trait]
impl ActionClient for HttpActionClient {
    async fn run(
        &self,
        action_url: &str,
        request_id: &str,
        body: &Value,
        bearer_token: &str,
    ) -> Result<ActionStatus> {
        let response = self
            .http
            .post(format!("{}/run", action_url.trim_end_matches('/')))
            .bearer_auth(bearer_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({"request_id": request_id, "body": body}))
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Action run failed: {}", e)))?;
        Self::parse_status(response, "run").await
    }

    async fn status(
        &self,
        action_url: &str,
        action_id: &str,
        bearer_token: &str,
    ) -> Result<ActionStatus> {
        let response = self
            .http
            .get(format!(
                "{}/{}/status",
                action_url.trim_end_matches('/'),
                action_id
            ))
            .bearer_auth(bearer_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Action status failed: {}", e)))?;
        Self::parse_status(response, "status").await
    }

    async fn release(
        &self,
        action_url: &str,
        action_id: &str,
        bearer_token: &str,
    ) -> Result<ActionStatus> {
        let response = self
            .http
            .post(format!(
                "{}/{}/release",
                action_url.trim_end_matches('/'),
                action_id
            ))
            .bearer_auth(bearer_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Action release failed: {}", e)))?;
        Self::parse_status(response, "release").await
    }
}
