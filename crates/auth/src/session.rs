//! Per-request authentication session
//!
//! Wraps a caller's bearer token with memoized accessors for the
//! introspection response, the derived user token, and the dependent
//! tokens. Each accessor resolves at most once per session and is safe
//! under concurrent first touch.

use serde_json::Value;
use shared::{Error, Result, Token, TokenSet};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::client::IdentityClient;

pub struct AuthInfo {
    client: Arc<IdentityClient>,
    access_token: String,
    introspection: OnceCell<Value>,
    dependent_tokens: OnceCell<HashMap<String, Token>>,
}

impl AuthInfo {
    pub fn new(client: Arc<IdentityClient>, bearer_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: bearer_token.into(),
            introspection: OnceCell::new(),
            dependent_tokens: OnceCell::new(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The introspection response for the caller's token, fetched once.
    pub async fn introspection(&self) -> Result<&Value> {
        if self.access_token.is_empty() {
            return Err(Error::unauthorized("No bearer token provided"));
        }
        self.introspection
            .get_or_try_init(|| async { self.client.introspect(&self.access_token, None).await })
            .await
    }

    /// The caller's identity subject.
    pub async fn sub(&self) -> Result<String> {
        self.introspection()
            .await?
            .get("sub")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::unauthorized("Token introspection carried no subject"))
    }

    async fn identities_set(&self) -> Result<Vec<String>> {
        Ok(self
            .introspection()
            .await?
            .get("identities_set")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// The caller's own token as a [`Token`] record.
    pub async fn user_token(&self) -> Result<Token> {
        let introspection = self.introspection().await?;
        Ok(Token {
            access_token: self.access_token.clone(),
            refresh_token: String::new(),
            scope: introspection
                .get("scope")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            expiration_time: introspection.get("exp").and_then(Value::as_i64).unwrap_or(0),
            resource_server: None,
            token_type: introspection
                .get("token_type")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Dependent tokens for the caller's token, keyed by scope.
    pub async fn dependent_tokens(&self) -> Result<&HashMap<String, Token>> {
        self.dependent_tokens
            .get_or_try_init(|| async {
                let tokens = self
                    .client
                    .dependent_token_exchange(&self.access_token, true)
                    .await?;
                Ok(tokens
                    .into_iter()
                    .map(|t| (t.scope.clone(), t))
                    .collect())
            })
            .await
    }

    /// Snapshot the caller's full token set (user token + dependent tokens).
    pub async fn token_set(&self) -> Result<TokenSet> {
        let user_token = self.user_token().await?;
        let dependent_tokens = self.dependent_tokens().await?.clone();
        Ok(TokenSet {
            user_token,
            dependent_tokens,
        })
    }

    /// Authorize the caller against a set of required principals.
    ///
    /// `public` admits anyone; `all_authenticated_users` admits any caller
    /// whose token introspects successfully; otherwise the caller's
    /// identity set must intersect the required principals.
    pub async fn authorize(
        &self,
        required_scope: &str,
        required_principals: &[&str],
    ) -> Result<()> {
        if required_principals.contains(&"public") {
            return Ok(());
        }
        let _ = self.introspection().await?;
        if required_principals.contains(&"all_authenticated_users") {
            return Ok(());
        }
        let identities = self.identities_set().await?;
        if required_principals
            .iter()
            .any(|p| identities.iter().any(|id| id == p))
        {
            Ok(())
        } else {
            tracing::info!(scope = required_scope, "Caller not in required principals");
            Err(Error::unauthorized("Unauthorized"))
        }
    }
}
