//! Identity service client
//!
//! Wraps the identity provider's token and scope APIs: introspection,
//! dependent-token exchange, refresh grants, and scope lookup/creation.
//! Scope lookups are cached (12 h TTL, bounded) and the client's own
//! composite scopes are indexed by their dependent-scope-id set so an
//! existing scope is reused instead of recreated.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{Error, Result, Token};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::transport::{AuthBody, AuthRequest, AuthTransport, HttpMethod, ReqwestAuthTransport};

/// Scope-id cache policy; the 12 hour TTL matches how rarely scope ids move
const SCOPE_ID_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const SCOPE_ID_CACHE_MAX: usize = 100;

/// Refresh-token grants as consumed by the poller engine
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Token>;
}

/// A token response entry; `expires_in` is relative and converted to an
/// absolute `expiration_time` before storage.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    resource_server: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
}

impl TokenGrant {
    fn into_token(self, fallback_refresh: Option<&str>) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| fallback_refresh.map(str::to_string))
                .unwrap_or_default(),
            scope: self.scope,
            expiration_time: Utc::now().timestamp() + self.expires_in,
            resource_server: self.resource_server,
            token_type: self.token_type,
        }
    }
}

struct CachedScopeId {
    id: String,
    inserted_at: Instant,
}

/// Client for the identity service
pub struct IdentityClient {
    transport: Arc<dyn AuthTransport>,
    base_url: String,
    client_id: String,
    scope_id_cache: DashMap<String, CachedScopeId>,
    /// dependent-scope-id set -> scope_string for scopes this client owns;
    /// `None` until first populated from the identity service
    owned_scopes: Mutex<Option<HashMap<BTreeSet<String>, String>>>,
}

impl IdentityClient {
    /// Create a client over an explicit transport (tests use a mock here).
    pub fn new(transport: Arc<dyn AuthTransport>, base_url: &str, client_id: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            scope_id_cache: DashMap::new(),
            owned_scopes: Mutex::new(None),
        }
    }

    /// Create a client using the shared reqwest connection pool.
    pub fn from_config(http: reqwest::Client, config: &shared::config::AuthConfig) -> Self {
        let transport = Arc::new(ReqwestAuthTransport::new(
            http,
            &config.client_id,
            &config.client_secret,
        ));
        Self::new(transport, &config.base_url, &config.client_id)
    }

    fn oauth_url(&self, path: &str) -> String {
        format!("{}/v2/oauth2{}", self.base_url, path)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v2/api{}", self.base_url, path)
    }

    /// Introspect an access token.
    ///
    /// Tried with the configured client id and, when that introspection
    /// comes back inactive, once more with `alternate_client_id`. An
    /// inactive token on every attempt is an authorization failure.
    pub async fn introspect(&self, token: &str, alternate_client_id: Option<&str>) -> Result<Value> {
        let mut attempts: Vec<Option<String>> = vec![None];
        if let Some(alt) = alternate_client_id {
            if alt != self.client_id {
                attempts.push(Some(alt.to_string()));
            }
        }

        for client_id_override in attempts {
            let response = self
                .transport
                .send(AuthRequest {
                    method: HttpMethod::Post,
                    url: self.oauth_url("/token/introspect"),
                    body: AuthBody::Form(vec![
                        ("token".to_string(), token.to_string()),
                        ("include".to_string(), "identities_set".to_string()),
                    ]),
                    client_id_override,
                })
                .await?;
            if response
                .get("active")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                return Ok(response);
            }
        }

        Err(Error::unauthorized("Expired or invalid bearer token"))
    }

    /// Exchange an access token for this client's dependent tokens.
    pub async fn dependent_token_exchange(
        &self,
        token: &str,
        offline_access: bool,
    ) -> Result<Vec<Token>> {
        let access_type = if offline_access { "offline" } else { "online" };
        let response = self
            .transport
            .send(AuthRequest {
                method: HttpMethod::Post,
                url: self.oauth_url("/token"),
                body: AuthBody::Form(vec![
                    (
                        "grant_type".to_string(),
                        "urn:globus:auth:grant_type:dependent_token".to_string(),
                    ),
                    ("token".to_string(), token.to_string()),
                    ("access_type".to_string(), access_type.to_string()),
                ]),
                client_id_override: None,
            })
            .await?;

        let grants: Vec<TokenGrant> = serde_json::from_value(response)
            .map_err(|e| Error::upstream(format!("Unexpected dependent token response: {}", e)))?;
        Ok(grants.into_iter().map(|g| g.into_token(None)).collect())
    }

    /// Redeem a refresh token for a fresh access token.
    ///
    /// Responses that omit `refresh_token` keep the one being redeemed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let response = self
            .transport
            .send(AuthRequest {
                method: HttpMethod::Post,
                url: self.oauth_url("/token"),
                body: AuthBody::Form(vec![
                    ("grant_type".to_string(), "refresh_token".to_string()),
                    ("refresh_token".to_string(), refresh_token.to_string()),
                ]),
                client_id_override: None,
            })
            .await?;

        let grant: TokenGrant = serde_json::from_value(response)
            .map_err(|e| Error::upstream(format!("Unexpected refresh response: {}", e)))?;
        Ok(grant.into_token(Some(refresh_token)))
    }

    /// List the scopes owned by this client.
    async fn my_scopes(&self) -> Result<Vec<Value>> {
        let response = self
            .transport
            .send(AuthRequest {
                method: HttpMethod::Get,
                url: self.api_url("/scopes"),
                body: AuthBody::Empty,
                client_id_override: None,
            })
            .await?;
        response
            .get("scopes")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| Error::upstream("Scope listing response missing 'scopes'"))
    }

    fn cache_scope_id(&self, scope_string: &str, id: &str) {
        self.scope_id_cache
            .retain(|_, entry| entry.inserted_at.elapsed() < SCOPE_ID_CACHE_TTL);
        if self.scope_id_cache.len() >= SCOPE_ID_CACHE_MAX {
            if let Some(oldest) = self
                .scope_id_cache
                .iter()
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key().clone())
            {
                self.scope_id_cache.remove(&oldest);
            }
        }
        self.scope_id_cache.insert(
            scope_string.to_string(),
            CachedScopeId {
                id: id.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Resolve scope strings to scope ids, consulting the TTL cache first.
    pub async fn lookup_scope_ids(&self, scope_strings: &[String]) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::new();
        let mut unknown = Vec::new();
        for scope_string in scope_strings {
            match self.scope_id_cache.get(scope_string) {
                Some(entry) if entry.inserted_at.elapsed() < SCOPE_ID_CACHE_TTL => {
                    resolved.insert(scope_string.clone(), entry.id.clone());
                }
                _ => unknown.push(scope_string.clone()),
            }
        }
        if unknown.is_empty() {
            return Ok(resolved);
        }

        let csv = unknown.join(",");
        let response = self
            .transport
            .send(AuthRequest {
                method: HttpMethod::Get,
                url: format!(
                    "{}?scope_strings={}",
                    self.api_url("/scopes"),
                    urlencoding::encode(&csv)
                ),
                body: AuthBody::Empty,
                client_id_override: None,
            })
            .await?;

        for scope in response
            .get("scopes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let (Some(scope_string), Some(id)) = (
                scope.get("scope_string").and_then(Value::as_str),
                scope.get("id").and_then(Value::as_str),
            ) else {
                continue;
            };
            resolved.insert(scope_string.to_string(), id.to_string());
            self.cache_scope_id(scope_string, id);
        }
        Ok(resolved)
    }

    /// Find or create a composite scope whose dependent scopes are exactly
    /// the given scope strings.
    ///
    /// The scope name and suffix derive deterministically from the dependent
    /// strings, so recreating after a lost cache lands on the same scope.
    pub async fn get_scope_for_dependent_set(
        &self,
        dependent_scope_strings: &[String],
    ) -> Result<String> {
        let scope_ids = self.lookup_scope_ids(dependent_scope_strings).await?;
        let id_set: BTreeSet<String> = scope_ids.values().cloned().collect();

        let mut owned = self.owned_scopes.lock().await;
        if owned.is_none() {
            let mut map = HashMap::new();
            for scope in self.my_scopes().await? {
                let Some(scope_string) = scope.get("scope_string").and_then(Value::as_str) else {
                    continue;
                };
                let dependent_ids: BTreeSet<String> = scope
                    .get("dependent_scopes")
                    .and_then(Value::as_array)
                    .map(|deps| {
                        deps.iter()
                            .filter_map(|d| d.get("scope").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                map.insert(dependent_ids, scope_string.to_string());
            }
            *owned = Some(map);
        }
        let map = owned.as_mut().expect("owned scope map initialized above");

        if let Some(existing) = map.get(&id_set) {
            return Ok(existing.clone());
        }

        let scope_name = gen_scope_name(dependent_scope_strings);
        let scope_suffix = gen_scope_suffix(dependent_scope_strings);
        tracing::info!(
            scope_suffix = %scope_suffix,
            dependent_scopes = ?dependent_scope_strings,
            "Creating composite scope"
        );
        let scope_string = self
            .create_scope(&scope_name, &scope_suffix, &id_set)
            .await?;
        map.insert(id_set, scope_string.clone());
        Ok(scope_string)
    }

    async fn create_scope(
        &self,
        scope_name: &str,
        scope_suffix: &str,
        dependent_scope_ids: &BTreeSet<String>,
    ) -> Result<String> {
        let dependent_scopes: Vec<Value> = dependent_scope_ids
            .iter()
            .map(|sid| {
                json!({
                    "scope": sid,
                    "optional": false,
                    "requires_refresh_token": true,
                })
            })
            .collect();
        let params = json!({
            "scope": {
                "name": scope_name,
                "description": format!("Run {}", scope_name),
                "scope_suffix": scope_suffix,
                "dependent_scopes": dependent_scopes,
            }
        });

        let response = self
            .transport
            .send(AuthRequest {
                method: HttpMethod::Post,
                url: self.api_url(&format!("/clients/{}/scopes", self.client_id)),
                body: AuthBody::Json(params),
                client_id_override: None,
            })
            .await?;

        response
            .get("scopes")
            .and_then(Value::as_array)
            .and_then(|scopes| scopes.first())
            .and_then(|scope| scope.get("scope_string"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::upstream(format!(
                    "Scope creation response missing scope_string: {}",
                    response
                ))
            })
    }
}

#[async_trait]
impl TokenRefresher for IdentityClient {
    async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        IdentityClient::refresh(self, refresh_token).await
    }
}

/// Join string tails into a bounded suffix, applying character replacements.
fn gen_truncated_from_suffixes(
    strings: &[String],
    max_len: usize,
    sep: &str,
    replacements: &[(&str, &str)],
) -> String {
    let mut out = String::new();
    if strings.is_empty() {
        return out;
    }
    let per_str_len = (max_len / strings.len()).saturating_sub(sep.len() + 1);
    for string in strings {
        let mut string = string.clone();
        for (from, to) in replacements {
            string = string.replace(from, to);
        }
        let char_count = string.chars().count();
        let tail: String = if char_count > per_str_len {
            string.chars().skip(char_count - per_str_len).collect()
        } else {
            string
        };
        out.push_str(sep);
        out.push_str(&tail);
    }
    out
}

fn gen_scope_name(dependent_scope_strings: &[String]) -> String {
    if dependent_scope_strings.is_empty() {
        return "For trigger service".to_string();
    }
    let suffix = gen_truncated_from_suffixes(dependent_scope_strings, 180, ",", &[]);
    format!("Trigger service using scopes{}", suffix)
}

fn gen_scope_suffix(dependent_scope_strings: &[String]) -> String {
    // any deterministic unique string works here
    let replacements = [("-", "_"), ("/", ""), (":", ""), (".", "")];
    let suffix = gen_truncated_from_suffixes(dependent_scope_strings, 50, "_", &replacements);
    format!("trigger_service{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Transport {}

        #[async_trait]
        impl AuthTransport for Transport {
            async fn send(&self, request: AuthRequest) -> Result<Value>;
        }
    }

    fn client(transport: MockTransport) -> IdentityClient {
        IdentityClient::new(Arc::new(transport), "https://auth.example.org", "client-1")
    }

    #[test]
    fn test_token_grant_conversion() {
        let grant = TokenGrant {
            access_token: "at".to_string(),
            refresh_token: None,
            scope: "scope".to_string(),
            resource_server: None,
            token_type: Some("Bearer".to_string()),
            expires_in: 3600,
        };
        let before = Utc::now().timestamp();
        let token = grant.into_token(Some("old-rt"));
        assert_eq!(token.refresh_token, "old-rt");
        assert!(token.expiration_time >= before + 3600);
        assert!(!token.requires_refresh());
    }

    #[test]
    fn test_scope_suffix_is_sanitized_and_deterministic() {
        let scopes = vec![
            "https://auth.globus.org/scopes/abc-123/receive".to_string(),
            "https://auth.globus.org/scopes/def-456/run".to_string(),
        ];
        let a = gen_scope_suffix(&scopes);
        let b = gen_scope_suffix(&scopes);
        assert_eq!(a, b);
        assert!(a.starts_with("trigger_service"));
        assert!(!a.contains('/'));
        assert!(!a.contains(':'));
        assert!(!a.contains('-'));
        assert!(!a.contains('.'));
    }

    #[tokio::test]
    async fn test_introspect_active() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|r| r.url.ends_with("/v2/oauth2/token/introspect"))
            .times(1)
            .returning(|_| Ok(json!({"active": true, "sub": "user-1"})));

        let response = client(transport).introspect("tok", None).await.unwrap();
        assert_eq!(response["sub"], json!("user-1"));
    }

    #[tokio::test]
    async fn test_introspect_inactive_retries_alternate_then_fails() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|r| r.url.ends_with("/v2/oauth2/token/introspect"))
            .times(2)
            .returning(|_| Ok(json!({"active": false})));

        let err = client(transport)
            .introspect("tok", Some("alternate-client"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_dependent_token_exchange_converts_expirations() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|r| r.url.ends_with("/v2/oauth2/token"))
            .times(1)
            .returning(|_| {
                Ok(json!([
                    {
                        "access_token": "dep-at",
                        "refresh_token": "dep-rt",
                        "scope": "https://auth.example.org/scopes/q/receive",
                        "resource_server": "queues",
                        "token_type": "Bearer",
                        "expires_in": 7200
                    }
                ]))
            });

        let tokens = client(transport)
            .dependent_token_exchange("tok", true)
            .await
            .unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].access_token, "dep-at");
        assert!(tokens[0].expiration_time > Utc::now().timestamp() + 7000);
    }

    #[tokio::test]
    async fn test_scope_for_dependent_set_created_once() {
        let scope_a = "https://auth.example.org/scopes/a/all".to_string();
        let scope_b = "https://auth.example.org/scopes/b/all".to_string();

        let mut transport = MockTransport::new();
        // id lookup for the two dependent scopes
        transport
            .expect_send()
            .withf(|r| r.url.contains("scope_strings="))
            .times(1)
            .returning(|_| {
                Ok(json!({"scopes": [
                    {"scope_string": "https://auth.example.org/scopes/a/all", "id": "id-a"},
                    {"scope_string": "https://auth.example.org/scopes/b/all", "id": "id-b"},
                ]}))
            });
        // owned-scope listing; nothing owned yet
        transport
            .expect_send()
            .withf(|r| r.method == HttpMethod::Get && r.url.ends_with("/v2/api/scopes"))
            .times(1)
            .returning(|_| Ok(json!({"scopes": []})));
        // exactly one creation across both calls
        transport
            .expect_send()
            .withf(|r| {
                r.method == HttpMethod::Post && r.url.ends_with("/clients/client-1/scopes")
            })
            .times(1)
            .returning(|_| {
                Ok(json!({"scopes": [
                    {"scope_string": "https://auth.example.org/scopes/composite/all"}
                ]}))
            });

        let client = client(transport);
        let scopes = vec![scope_a, scope_b];
        let first = client.get_scope_for_dependent_set(&scopes).await.unwrap();
        let second = client.get_scope_for_dependent_set(&scopes).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "https://auth.example.org/scopes/composite/all");
    }
}
