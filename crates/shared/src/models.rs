//! Data models for the trigger service
//!
//! A trigger binds a message queue to an action endpoint through a filter
//! expression and a body template. These types are shared between the HTTP
//! surface, the poller engine, and the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle states of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    Pending,
    Enabled,
    NoQueue,
    Deleting,
    Deleted,
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerState::Pending => "PENDING",
            TriggerState::Enabled => "ENABLED",
            TriggerState::NoQueue => "NO_QUEUE",
            TriggerState::Deleting => "DELETING",
            TriggerState::Deleted => "DELETED",
        };
        write!(f, "{}", s)
    }
}

/// Status values reported by an action endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatusValue {
    Succeeded,
    Failed,
    Active,
    Inactive,
}

impl std::fmt::Display for ActionStatusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatusValue::Succeeded => "SUCCEEDED",
            ActionStatusValue::Failed => "FAILED",
            ActionStatusValue::Active => "ACTIVE",
            ActionStatusValue::Inactive => "INACTIVE",
        };
        write!(f, "{}", s)
    }
}

/// One observation of an action's asynchronous lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStatus {
    pub status: ActionStatusValue,
    pub action_id: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ActionStatus {
    /// SUCCEEDED and FAILED are terminal; everything else keeps being polled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ActionStatusValue::Succeeded | ActionStatusValue::Failed
        )
    }
}

/// A raw message as returned by the queue service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    #[serde(default)]
    pub message_body: String,
    pub receipt_handle: String,
    #[serde(default)]
    pub sent_timestamp: String,
    #[serde(default)]
    pub sent_by_effective_identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_by_app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_by_identity_set: Option<Vec<String>>,
}

/// One decoded message pulled from the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub body: Value,
    pub event_id: String,
    pub sent_by_effective_identity: String,
    pub timestamp: String,
    // serialized even when absent so filter expressions can name them
    #[serde(default)]
    pub sent_by_app: Option<String>,
    #[serde(default)]
    pub sent_by_identity_set: Option<Vec<String>>,
}

impl Event {
    /// Decode a queue message into an event.
    ///
    /// The message body is attempted as JSON; a body that does not parse is
    /// wrapped so the raw text and the parse error both remain visible to
    /// filter and template expressions.
    pub fn from_queue_message(msg: &QueueMessage) -> Self {
        let body = match serde_json::from_str::<Value>(&msg.message_body) {
            Ok(parsed) => parsed,
            Err(e) => serde_json::json!({
                "message": msg.message_body,
                "json_parse_status": e.to_string(),
            }),
        };
        Event {
            body,
            event_id: msg.message_id.clone(),
            sent_by_effective_identity: msg.sent_by_effective_identity.clone(),
            timestamp: msg.sent_timestamp.clone(),
            sent_by_app: msg.sent_by_app.clone(),
            sent_by_identity_set: msg.sent_by_identity_set.clone(),
        }
    }
}

/// An OAuth2 token with its absolute expiration time (unix seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expiration_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Token {
    /// A token within 300 seconds of expiry is treated as expired to absorb
    /// clock skew and in-flight request time.
    pub fn requires_refresh(&self) -> bool {
        Utc::now().timestamp() + 300 >= self.expiration_time
    }
}

/// The tokens snapshotted into a trigger when it is enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub user_token: Token,
    #[serde(default)]
    pub dependent_tokens: HashMap<String, Token>,
}

/// The client-supplied portion of a trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub queue_id: Uuid,
    pub action_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_scope: Option<String>,
    pub event_filter: String,
    pub event_template: Value,
}

/// The full trigger record as persisted and owned by a poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(flatten)]
    pub spec: TriggerSpec,
    pub trigger_id: String,
    pub created_by: String,
    pub globus_auth_scope: String,
    pub state: TriggerState,
    #[serde(default)]
    pub event_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_status: Option<ActionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_action_status: Option<ActionStatus>,
    #[serde(default)]
    pub all_action_status: Vec<ActionStatus>,
    pub token_set: TokenSet,
}

impl Trigger {
    /// Record an observed action status on the trigger.
    ///
    /// Updates `last_action_status`, tracks the most recent failure
    /// separately, and appends to the bounded status log, dropping the
    /// oldest entries beyond `log_limit`.
    pub fn record_action_status(&mut self, status: ActionStatus, log_limit: usize) {
        if status.status == ActionStatusValue::Failed {
            self.last_error_action_status = Some(status.clone());
        }
        self.all_action_status.push(status.clone());
        if self.all_action_status.len() > log_limit {
            let excess = self.all_action_status.len() - log_limit;
            self.all_action_status.drain(..excess);
        }
        self.last_action_status = Some(status);
    }
}
