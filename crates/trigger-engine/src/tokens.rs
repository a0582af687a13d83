//! Token selection for outbound calls
//!
//! Every queue and action call is authorized by a dependent token from the
//! trigger's snapshotted token set. Tokens close to expiry are refreshed
//! through the identity client and the refreshed token is written back so
//! the next persist carries it.

use auth::TokenRefresher;
use shared::{Error, Result, Trigger};

/// Bearer token for calls under `scope`, refreshing it first when needed.
pub async fn bearer_for_scope(
    trigger: &mut Trigger,
    scope: &str,
    refresher: &dyn TokenRefresher,
) -> Result<String> {
    let token = trigger
        .token_set
        .dependent_tokens
        .get_mut(scope)
        .ok_or_else(|| Error::unauthorized(format!("No dependent token for scope {}", scope)))?;

    if token.requires_refresh() && !token.refresh_token.is_empty() {
        tracing::debug!(
            trigger_id = %trigger.trigger_id,
            scope = scope,
            "Refreshing dependent token"
        );
        *token = refresher.refresh(&token.refresh_token).await?;
    }

    Ok(token.access_token.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use shared::{Token, TokenSet, TriggerSpec, TriggerState};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct CountingRefresher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<Token> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Token {
                access_token: "fresh-at".to_string(),
                refresh_token: "fresh-rt".to_string(),
                scope: "scope".to_string(),
                expiration_time: i64::MAX,
                resource_server: None,
                token_type: None,
            })
        }
    }

    fn trigger_with_token(expiration_time: i64) -> Trigger {
        let mut dependent_tokens = HashMap::new();
        dependent_tokens.insert(
            "scope".to_string(),
            Token {
                access_token: "old-at".to_string(),
                refresh_token: "old-rt".to_string(),
                scope: "scope".to_string(),
                expiration_time,
                resource_server: None,
                token_type: None,
            },
        );
        Trigger {
            spec: TriggerSpec {
                queue_id: Uuid::new_v4(),
                action_url: "https://actions.example.org/a".to_string(),
                action_scope: Some("scope".to_string()),
                event_filter: "True".to_string(),
                event_template: json!({}),
            },
            trigger_id: "t-1".to_string(),
            created_by: "user".to_string(),
            globus_auth_scope: "gs".to_string(),
            state: TriggerState::Enabled,
            event_count: 0,
            last_event: None,
            last_action_status: None,
            last_error_action_status: None,
            all_action_status: Vec::new(),
            token_set: TokenSet {
                user_token: Token {
                    access_token: "ut".to_string(),
                    refresh_token: String::new(),
                    scope: "user-scope".to_string(),
                    expiration_time: i64::MAX,
                    resource_server: None,
                    token_type: None,
                },
                dependent_tokens,
            },
        }
    }

    #[tokio::test]
    async fn test_fresh_token_used_as_is() {
        let refresher = CountingRefresher {
            calls: AtomicU32::new(0),
        };
        let mut trigger = trigger_with_token(i64::MAX);
        let bearer = bearer_for_scope(&mut trigger, "scope", &refresher)
            .await
            .unwrap();
        assert_eq!(bearer, "old-at");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiring_token_refreshed_and_written_back() {
        let refresher = CountingRefresher {
            calls: AtomicU32::new(0),
        };
        let mut trigger = trigger_with_token(0);
        let bearer = bearer_for_scope(&mut trigger, "scope", &refresher)
            .await
            .unwrap();
        assert_eq!(bearer, "fresh-at");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            trigger.token_set.dependent_tokens["scope"].access_token,
            "fresh-at"
        );
    }

    #[tokio::test]
    async fn test_missing_scope_is_unauthorized() {
        let refresher = CountingRefresher {
            calls: AtomicU32::new(0),
        };
        let mut trigger = trigger_with_token(i64::MAX);
        let err = bearer_for_scope(&mut trigger, "other-scope", &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
