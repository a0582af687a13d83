//! Trigger request and response DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{ActionStatus, Event, Trigger, TriggerSpec, TriggerState};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /triggers`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTriggerRequest {
    /// Queue the trigger drains
    pub queue_id: Uuid,

    /// Action endpoint invoked for matching events
    #[validate(url)]
    pub action_url: String,

    /// Scope authorizing the action endpoint; discovered from the action
    /// URL when omitted
    #[serde(default)]
    pub action_scope: Option<String>,

    /// Expression deciding whether an event dispatches the action
    #[validate(length(min = 1))]
    pub event_filter: String,

    /// JSON body template; keys ending in `.=` carry expressions
    #[schema(value_type = Object)]
    pub event_template: Value,
}

impl CreateTriggerRequest {
    pub fn into_spec(self) -> TriggerSpec {
        TriggerSpec {
            queue_id: self.queue_id,
            action_url: self.action_url,
            action_scope: self.action_scope,
            event_filter: self.event_filter,
            event_template: self.event_template,
        }
    }
}

/// The externally visible view of a trigger: the full record minus the
/// snapshotted token set and the internal status log.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseTrigger {
    pub trigger_id: String,
    pub queue_id: Uuid,
    pub action_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_scope: Option<String>,
    pub event_filter: String,
    #[schema(value_type = Object)]
    pub event_template: Value,
    pub created_by: String,
    pub globus_auth_scope: String,
    #[schema(value_type = String)]
    pub state: TriggerState,
    pub event_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub last_event: Option<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub last_action_status: Option<ActionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub last_error_action_status: Option<ActionStatus>,
}

impl From<&Trigger> for ResponseTrigger {
    fn from(trigger: &Trigger) -> Self {
        Self {
            trigger_id: trigger.trigger_id.clone(),
            queue_id: trigger.spec.queue_id,
            action_url: trigger.spec.action_url.clone(),
            action_scope: trigger.spec.action_scope.clone(),
            event_filter: trigger.spec.event_filter.clone(),
            event_template: trigger.spec.event_template.clone(),
            created_by: trigger.created_by.clone(),
            globus_auth_scope: trigger.globus_auth_scope.clone(),
            state: trigger.state,
            event_count: trigger.event_count,
            last_event: trigger.last_event.clone(),
            last_action_status: trigger.last_action_status.clone(),
            last_error_action_status: trigger.last_error_action_status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_validation() {
        let ok: CreateTriggerRequest = serde_json::from_value(json!({
            "queue_id": "9a36f434-0d4c-4a85-9a4b-14d6c0c4e2a8",
            "action_url": "https://actions.example.org/hello",
            "event_filter": "event_count >= 1",
            "event_template": {"x.=": "body.n"}
        }))
        .unwrap();
        assert!(ok.validate().is_ok());

        let bad_url: CreateTriggerRequest = serde_json::from_value(json!({
            "queue_id": "9a36f434-0d4c-4a85-9a4b-14d6c0c4e2a8",
            "action_url": "not a url",
            "event_filter": "True",
            "event_template": {}
        }))
        .unwrap();
        assert!(bad_url.validate().is_err());

        let empty_filter: CreateTriggerRequest = serde_json::from_value(json!({
            "queue_id": "9a36f434-0d4c-4a85-9a4b-14d6c0c4e2a8",
            "action_url": "https://actions.example.org/hello",
            "event_filter": "",
            "event_template": {}
        }))
        .unwrap();
        assert!(empty_filter.validate().is_err());
    }
}
