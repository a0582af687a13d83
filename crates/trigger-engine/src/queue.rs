//! Queue service client
//!
//! Receives and deletes messages against the external queue HTTP API.
//! Abstracted behind a trait so poller behavior can be tested without a
//! queue service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shared::{Error, QueueMessage, Result};
use std::time::Duration;
use uuid::Uuid;

/// Outbound HTTP timeout for queue calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Message receive/delete operations against a queue
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages` messages from a queue.
    async fn receive(
        &self,
        queue_id: Uuid,
        max_messages: u32,
        bearer_token: &str,
    ) -> Result<Vec<QueueMessage>>;

    /// Delete a message by its receipt handle.
    async fn delete(&self, queue_id: Uuid, receipt_handle: &str, bearer_token: &str)
        -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    data: Vec<QueueMessage>,
}

/// HTTP implementation of [`QueueClient`]
pub struct HttpQueueClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpQueueClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self, queue_id: Uuid) -> String {
        format!("{}/queues/{}/messages", self.base_url, queue_id)
    }
}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn receive(
        &self,
        queue_id: Uuid,
        max_messages: u32,
        bearer_token: &str,
    ) -> Result<Vec<QueueMessage>> {
        let response = self
            .http
            .get(format!(
                "{}?max_messages={}",
                self.messages_url(queue_id),
                max_messages
            ))
            .bearer_auth(bearer_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Queue receive failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!(
                "Queue {} returned {}: {}",
                queue_id, status, text
            )));
        }

        let envelope: MessagesEnvelope = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse queue response: {}", e)))?;
        Ok(envelope.data)
    }

    async fn delete(
        &self,
        queue_id: Uuid,
        receipt_handle: &str,
        bearer_token: &str,
    ) -> Result<()> {
        let response = self
            .http
            .delete(self.messages_url(queue_id))
            .bearer_auth(bearer_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({"data": [{"receipt_handle": receipt_handle}]}))
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Queue delete failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!(
                "Queue {} message delete returned {}: {}",
                queue_id, status, text
            )));
        }
        Ok(())
    }
}
