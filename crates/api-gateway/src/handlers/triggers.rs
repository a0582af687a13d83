//! Trigger handlers
//!
//! The CRUD and lifecycle surface for triggers. Lifecycle transitions go
//! through the in-process state registry (the authority while a poller may
//! be running); durable state lives in the trigger store.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::Value;
use uuid::Uuid;

use auth::AuthInfo;
use shared::{Error, ScanClause, ScanValue, Trigger, TriggerState};
use trigger_engine::QUEUES_RECEIVE_SCOPE;

use crate::handlers::helpers::{auth_session, error_response, request_id, validate_request};
use crate::models::{CreateTriggerRequest, ErrorResponse, ResponseTrigger};
use crate::state::AppState;

/// Scope a caller needs for trigger management
pub const MANAGE_TRIGGERS_SCOPE: &str =
    "https://auth.globus.org/scopes/5292be17-96f0-4ab6-957a-ecd516a1759e/manage_triggers";

async fn lookup_trigger(
    state: &AppState,
    trigger_id: &str,
    auth: Option<&AuthInfo>,
) -> Result<Trigger, Error> {
    let Some(trigger) = state.store.get(trigger_id).await? else {
        return Err(Error::not_found("Trigger", trigger_id));
    };
    if let Some(auth) = auth {
        auth.authorize(&trigger.globus_auth_scope, &[trigger.created_by.as_str()])
            .await?;
    }
    Ok(trigger)
}

/// Create a trigger
///
/// Registers a queue-to-action binding in state PENDING. When
/// `action_scope` is omitted it is discovered by introspecting the action
/// URL; a scope that cannot be discovered rejects the request.
#[utoipa::path(
    post,
    path = "/triggers",
    tag = "Triggers",
    request_body = CreateTriggerRequest,
    responses(
        (status = 200, description = "Trigger created", body = ResponseTrigger),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn create_trigger(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    req: web::Json<CreateTriggerRequest>,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let auth = auth_session(&state, &req_http);

    if let Err(e) = auth
        .authorize(MANAGE_TRIGGERS_SCOPE, &["all_authenticated_users"])
        .await
    {
        return error_response(&req_id, &e);
    }
    if let Err(resp) = validate_request(&*req, &req_id) {
        return resp;
    }

    let mut spec = req.into_inner().into_spec();

    // Discover the action scope from the action provider when not supplied
    if spec.action_scope.is_none() {
        let introspect = state
            .http
            .get(&spec.action_url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await;
        match introspect {
            Ok(response) if response.status().is_success() => {
                if let Ok(body) = response.json::<Value>().await {
                    spec.action_scope = body
                        .get("globus_auth_scope")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
            }
            Ok(response) => {
                tracing::info!(
                    action_url = %spec.action_url,
                    status = %response.status(),
                    "Action provider introspection failed"
                );
            }
            Err(e) => {
                tracing::info!(
                    action_url = %spec.action_url,
                    error = %e,
                    "Failed to retrieve scope from action URL"
                );
            }
        }
    }
    let Some(action_scope) = spec.action_scope.clone() else {
        return error_response(
            &req_id,
            &Error::validation(format!(
                "'action_scope' not provided and unable to retrieve from {}",
                spec.action_url
            )),
        );
    };

    let scope_for_trigger = match state
        .identity
        .get_scope_for_dependent_set(&[action_scope, QUEUES_RECEIVE_SCOPE.to_string()])
        .await
    {
        Ok(scope) => scope,
        Err(e) => return error_response(&req_id, &e),
    };

    let created_by = match auth.sub().await {
        Ok(sub) => sub,
        Err(e) => return error_response(&req_id, &e),
    };
    let token_set = match auth.token_set().await {
        Ok(token_set) => token_set,
        Err(e) => return error_response(&req_id, &e),
    };

    let trigger = Trigger {
        spec,
        trigger_id: Uuid::new_v4().to_string(),
        created_by,
        globus_auth_scope: scope_for_trigger,
        state: TriggerState::Pending,
        event_count: 0,
        last_event: None,
        last_action_status: None,
        last_error_action_status: None,
        all_action_status: Vec::new(),
        token_set,
    };
    if let Err(e) = state.store.put(&trigger).await {
        return error_response(&req_id, &e);
    }

    tracing::info!(trigger_id = %trigger.trigger_id, "Created trigger");
    HttpResponse::Ok().json(ResponseTrigger::from(&trigger))
}

/// Fetch a trigger
#[utoipa::path(
    get,
    path = "/triggers/{trigger_id}",
    tag = "Triggers",
    params(("trigger_id" = String, Path, description = "Trigger id")),
    responses(
        (status = 200, description = "Trigger", body = ResponseTrigger),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown trigger", body = ErrorResponse)
    )
)]
pub async fn get_trigger(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let trigger_id = path.into_inner();
    let auth = auth_session(&state, &req_http);

    match lookup_trigger(&state, &trigger_id, Some(&auth)).await {
        Ok(trigger) => HttpResponse::Ok().json(ResponseTrigger::from(&trigger)),
        Err(e) => error_response(&req_id, &e),
    }
}

/// List the caller's triggers
#[utoipa::path(
    get,
    path = "/triggers",
    tag = "Triggers",
    responses(
        (status = 200, description = "Triggers created by the caller", body = [ResponseTrigger]),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn list_triggers(
    state: web::Data<AppState>,
    req_http: HttpRequest,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let auth = auth_session(&state, &req_http);

    let sub = match auth.sub().await {
        Ok(sub) => sub,
        Err(e) => return error_response(&req_id, &e),
    };

    let mut clause = ScanClause::new();
    clause.insert(
        "created_by".to_string(),
        ScanValue::One(Value::String(sub)),
    );
    match state.store.scan(&[clause]).await {
        Ok(triggers) => {
            let response: Vec<ResponseTrigger> =
                triggers.iter().map(ResponseTrigger::from).collect();
            HttpResponse::Ok().json(response)
        }
        Err(e) => error_response(&req_id, &e),
    }
}

/// Enable a trigger
///
/// Snapshots the caller's token set into the trigger, transitions it to
/// ENABLED, and spawns its poller. A caller whose tokens carry no
/// queue-receive dependent token cannot poll, so the trigger lands in
/// NO_QUEUE instead.
#[utoipa::path(
    post,
    path = "/triggers/{trigger_id}/enable",
    tag = "Triggers",
    params(("trigger_id" = String, Path, description = "Trigger id")),
    responses(
        (status = 200, description = "Trigger enabled", body = ResponseTrigger),
        (status = 400, description = "Queue not accessible with caller tokens", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown trigger", body = ErrorResponse),
        (status = 409, description = "Trigger is being deleted", body = ErrorResponse)
    )
)]
pub async fn enable_trigger(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let trigger_id = path.into_inner();
    let auth = auth_session(&state, &req_http);

    let mut trigger = match lookup_trigger(&state, &trigger_id, Some(&auth)).await {
        Ok(trigger) => trigger,
        Err(e) => return error_response(&req_id, &e),
    };

    let token_set = match auth.token_set().await {
        Ok(token_set) => token_set,
        Err(e) => return error_response(&req_id, &e),
    };

    if !token_set.dependent_tokens.contains_key(QUEUES_RECEIVE_SCOPE) {
        let previous = match state.registry.set(&trigger_id, TriggerState::NoQueue) {
            Ok(previous) => previous,
            Err(e) => return error_response(&req_id, &e),
        };
        trigger.state = TriggerState::NoQueue;
        // a previously running poller owns the durable record and persists
        // the state itself when it exits
        if previous != TriggerState::Enabled {
            if let Err(e) = state.store.put(&trigger).await {
                return error_response(&req_id, &e);
            }
        }
        return error_response(
            &req_id,
            &Error::validation(format!(
                "Caller tokens carry no dependent token for {}; cannot read queue {}",
                QUEUES_RECEIVE_SCOPE, trigger.spec.queue_id
            )),
        );
    }

    // registry first so a concurrent delete cannot leave a durable ENABLED
    // row with no poller
    let previous = match state.registry.set(&trigger_id, TriggerState::Enabled) {
        Ok(previous) => previous,
        Err(e) => return error_response(&req_id, &e),
    };

    trigger.state = TriggerState::Enabled;
    trigger.token_set = token_set;

    // an already-enabled trigger keeps its single poller, which owns all
    // durable writes from here
    if previous != TriggerState::Enabled {
        if let Err(e) = state.store.put(&trigger).await {
            return error_response(&req_id, &e);
        }
        if let Err(e) = state.supervisor.spawn_poller(trigger.clone()).await {
            return error_response(&req_id, &e);
        }
    }

    tracing::info!(trigger_id = %trigger_id, "Enabled trigger");
    HttpResponse::Ok().json(ResponseTrigger::from(&trigger))
}

/// Disable a trigger
///
/// Transitions the trigger back to PENDING. Its poller observes the
/// transition on its next tick, keeps draining outstanding actions, and
/// persists the final state when it exits.
#[utoipa::path(
    post,
    path = "/triggers/{trigger_id}/disable",
    tag = "Triggers",
    params(("trigger_id" = String, Path, description = "Trigger id")),
    responses(
        (status = 200, description = "Trigger disabled", body = ResponseTrigger),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown trigger", body = ErrorResponse),
        (status = 409, description = "Trigger is being deleted", body = ErrorResponse)
    )
)]
pub async fn disable_trigger(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let trigger_id = path.into_inner();
    let auth = auth_session(&state, &req_http);

    let mut trigger = match lookup_trigger(&state, &trigger_id, Some(&auth)).await {
        Ok(trigger) => trigger,
        Err(e) => return error_response(&req_id, &e),
    };

    if let Err(e) = state.registry.set(&trigger_id, TriggerState::Pending) {
        return error_response(&req_id, &e);
    }

    tracing::info!(trigger_id = %trigger_id, "Disabled trigger");
    trigger.state = TriggerState::Pending;
    HttpResponse::Ok().json(ResponseTrigger::from(&trigger))
}

/// Inject an event (stub)
///
/// Server-side event injection is not wired to the queue yet; the endpoint
/// validates trigger state and accepts the event.
#[utoipa::path(
    post,
    path = "/triggers/{trigger_id}/event",
    tag = "Triggers",
    params(("trigger_id" = String, Path, description = "Trigger id")),
    responses(
        (status = 202, description = "Event accepted"),
        (status = 404, description = "Unknown trigger", body = ErrorResponse),
        (status = 409, description = "Trigger is not enabled", body = ErrorResponse)
    )
)]
pub async fn send_event(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    path: web::Path<String>,
    _body: web::Json<Value>,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let trigger_id = path.into_inner();

    if let Err(e) = lookup_trigger(&state, &trigger_id, None).await {
        return error_response(&req_id, &e);
    }

    let current = state.registry.get(&trigger_id);
    if current != TriggerState::Enabled {
        return error_response(
            &req_id,
            &Error::conflict(format!(
                "Cannot send an event to trigger {} in state {}",
                trigger_id, current
            )),
        );
    }

    HttpResponse::Accepted().json(serde_json::json!({}))
}

/// Delete a trigger
///
/// Transitions to DELETING. A trigger with no running poller is removed
/// from the store immediately; an enabled one is removed by the reaper
/// once its poller exits.
#[utoipa::path(
    delete,
    path = "/triggers/{trigger_id}",
    tag = "Triggers",
    params(("trigger_id" = String, Path, description = "Trigger id")),
    responses(
        (status = 200, description = "Trigger deleted", body = ResponseTrigger),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown trigger", body = ErrorResponse),
        (status = 409, description = "Trigger is already being deleted", body = ErrorResponse)
    )
)]
pub async fn delete_trigger(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let req_id = request_id(&req_http);
    let trigger_id = path.into_inner();
    let auth = auth_session(&state, &req_http);

    let mut trigger = match lookup_trigger(&state, &trigger_id, Some(&auth)).await {
        Ok(trigger) => trigger,
        Err(e) => return error_response(&req_id, &e),
    };

    let previous = match state.registry.set(&trigger_id, TriggerState::Deleting) {
        Ok(previous) => previous,
        Err(e) => return error_response(&req_id, &e),
    };

    // an enabled trigger's poller cleans up through the reaper; anything
    // else is removed here
    if previous != TriggerState::Enabled {
        if let Err(e) = state.store.delete(&trigger_id).await {
            return error_response(&req_id, &e);
        }
    }

    tracing::info!(trigger_id = %trigger_id, previous_state = %previous, "Deleting trigger");
    trigger.state = TriggerState::Deleting;
    HttpResponse::Ok().json(ResponseTrigger::from(&trigger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};
    use async_trait::async_trait;
    use auth::{AuthRequest, AuthTransport, IdentityClient};
    use serde_json::json;
    use shared::models::{Token, TokenSet, TriggerSpec};
    use shared::{ActionStatus, MemoryTriggerStore, QueueMessage, Result, TriggerStore};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use trigger_engine::{
        ActionClient, PollerContext, PollerSupervisor, QueueClient, TriggerStateRegistry,
    };

    struct StubTransport;

    #[async_trait]
    impl AuthTransport for StubTransport {
        async fn send(&self, request: AuthRequest) -> Result<Value> {
            if request.url.ends_with("/token/introspect") {
                Ok(json!({
                    "active": true,
                    "sub": "user-1",
                    "scope": "openid",
                    "exp": 4102444800i64,
                    "token_type": "Bearer",
                    "identities_set": ["user-1"]
                }))
            } else if request.url.ends_with("/v2/oauth2/token") {
                Ok(json!([{
                    "access_token": "dep-at",
                    "refresh_token": "dep-rt",
                    "scope": QUEUES_RECEIVE_SCOPE,
                    "expires_in": 3600
                }]))
            } else if request.url.contains("scope_strings=") {
                Ok(json!({"scopes": [
                    {"scope_string": "https://actions.example.org/scope", "id": "id-action"},
                    {"scope_string": QUEUES_RECEIVE_SCOPE, "id": "id-queue"},
                ]}))
            } else if request.url.contains("/clients/") {
                Ok(json!({"scopes": [
                    {"scope_string": "https://auth.example.org/scopes/composite/all"}
                ]}))
            } else {
                Ok(json!({"scopes": []}))
            }
        }
    }

    struct EmptyQueue;

    #[async_trait]
    impl QueueClient for EmptyQueue {
        async fn receive(
            &self,
            _queue_id: uuid::Uuid,
            _max_messages: u32,
            _bearer_token: &str,
        ) -> Result<Vec<QueueMessage>> {
            Ok(Vec::new())
        }

        async fn delete(
            &self,
            _queue_id: uuid::Uuid,
            _receipt_handle: &str,
            _bearer_token: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct NoopActions;

    #[async_trait]
    impl ActionClient for NoopActions {
        async fn run(
            &self,
            _action_url: &str,
            _request_id: &str,
            _body: &Value,
            _bearer_token: &str,
        ) -> Result<ActionStatus> {
            Err(Error::upstream("unused"))
        }

        async fn status(
            &self,
            _action_url: &str,
            _action_id: &str,
            _bearer_token: &str,
        ) -> Result<ActionStatus> {
            Err(Error::upstream("unused"))
        }

        async fn release(
            &self,
            _action_url: &str,
            _action_id: &str,
            _bearer_token: &str,
        ) -> Result<ActionStatus> {
            Err(Error::upstream("unused"))
        }
    }

    fn app_state() -> web::Data<AppState> {
        let store: Arc<dyn TriggerStore> = Arc::new(MemoryTriggerStore::new());
        let identity = Arc::new(IdentityClient::new(
            Arc::new(StubTransport),
            "https://auth.example.org",
            "client-1",
        ));
        let registry = Arc::new(TriggerStateRegistry::new());
        let ctx = PollerContext {
            store: store.clone(),
            queue: Arc::new(EmptyQueue),
            actions: Arc::new(NoopActions),
            refresher: identity.clone(),
            registry: registry.clone(),
            shutdown: CancellationToken::new(),
            action_status_log_limit: 100,
        };
        let supervisor = Arc::new(PollerSupervisor::new(ctx, 100));
        web::Data::new(AppState {
            store,
            identity,
            registry,
            supervisor,
            http: reqwest::Client::new(),
        })
    }

    fn seeded_trigger(state: TriggerState) -> Trigger {
        let mut dependent_tokens = HashMap::new();
        dependent_tokens.insert(
            QUEUES_RECEIVE_SCOPE.to_string(),
            Token {
                access_token: "dep-at".to_string(),
                refresh_token: "dep-rt".to_string(),
                scope: QUEUES_RECEIVE_SCOPE.to_string(),
                expiration_time: i64::MAX,
                resource_server: None,
                token_type: None,
            },
        );
        Trigger {
            spec: TriggerSpec {
                queue_id: uuid::Uuid::new_v4(),
                action_url: "https://actions.example.org/hello".to_string(),
                action_scope: Some("https://actions.example.org/scope".to_string()),
                event_filter: "True".to_string(),
                event_template: json!({}),
            },
            trigger_id: "t-1".to_string(),
            created_by: "user-1".to_string(),
            globus_auth_scope: "https://auth.example.org/scopes/composite/all".to_string(),
            state,
            event_count: 0,
            last_event: None,
            last_action_status: None,
            last_error_action_status: None,
            all_action_status: Vec::new(),
            token_set: TokenSet {
                user_token: Token {
                    access_token: "at".to_string(),
                    refresh_token: String::new(),
                    scope: "openid".to_string(),
                    expiration_time: i64::MAX,
                    resource_server: None,
                    token_type: None,
                },
                dependent_tokens,
            },
        }
    }

    fn app(
        state: web::Data<AppState>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(state)
            .route("/triggers", web::post().to(create_trigger))
            .route("/triggers", web::get().to(list_triggers))
            .route("/triggers/{trigger_id}", web::get().to(get_trigger))
            .route(
                "/triggers/{trigger_id}/enable",
                web::post().to(enable_trigger),
            )
            .route(
                "/triggers/{trigger_id}/disable",
                web::post().to(disable_trigger),
            )
            .route("/triggers/{trigger_id}/event", web::post().to(send_event))
            .route("/triggers/{trigger_id}", web::delete().to(delete_trigger))
    }

    #[actix_web::test]
    async fn test_get_unknown_trigger_is_404_with_error_shape() {
        let state = app_state();
        let app = test::init_service(app(state)).await;

        let req = test::TestRequest::get().uri("/triggers/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].is_string());
        assert!(body["req_id"].is_string());
    }

    #[actix_web::test]
    async fn test_create_trigger_persists_pending() {
        let state = app_state();
        let app = test::init_service(app(state.clone())).await;

        let req = test::TestRequest::post()
            .uri("/triggers")
            .insert_header(("authorization", "Bearer caller-token"))
            .set_json(json!({
                "queue_id": "9a36f434-0d4c-4a85-9a4b-14d6c0c4e2a8",
                "action_url": "https://actions.example.org/hello",
                "action_scope": "https://actions.example.org/scope",
                "event_filter": "event_count >= 1",
                "event_template": {"x.=": "body.n"}
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["state"], json!("PENDING"));
        assert_eq!(body["created_by"], json!("user-1"));
        assert_eq!(
            body["globus_auth_scope"],
            json!("https://auth.example.org/scopes/composite/all")
        );
        // token set is internal and never serialized in responses
        assert!(body.get("token_set").is_none());

        let trigger_id = body["trigger_id"].as_str().unwrap();
        let stored = state.store.get(trigger_id).await.unwrap().unwrap();
        assert_eq!(stored.state, TriggerState::Pending);
        assert_eq!(stored.token_set.user_token.access_token, "caller-token");
    }

    #[actix_web::test]
    async fn test_get_trigger_requires_bearer_token() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        let app = test::init_service(app(state)).await;

        let req = test::TestRequest::get().uri("/triggers/t-1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);

        let req = test::TestRequest::get()
            .uri("/triggers/t-1")
            .insert_header(("authorization", "Bearer caller-token"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["trigger_id"], json!("t-1"));
        assert_eq!(body["created_by"], json!("user-1"));
    }

    #[actix_web::test]
    async fn test_create_trigger_requires_bearer_token() {
        let state = app_state();
        let app = test::init_service(app(state)).await;

        let req = test::TestRequest::post()
            .uri("/triggers")
            .set_json(json!({
                "queue_id": "9a36f434-0d4c-4a85-9a4b-14d6c0c4e2a8",
                "action_url": "https://actions.example.org/hello",
                "action_scope": "https://actions.example.org/scope",
                "event_filter": "True",
                "event_template": {}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn test_enable_then_disable() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        let app = test::init_service(app(state.clone())).await;

        let req = test::TestRequest::post()
            .uri("/triggers/t-1/enable")
            .insert_header(("authorization", "Bearer caller-token"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], json!("ENABLED"));
        assert_eq!(state.registry.get("t-1"), TriggerState::Enabled);
        assert_eq!(
            state.store.get("t-1").await.unwrap().unwrap().state,
            TriggerState::Enabled
        );

        let req = test::TestRequest::post()
            .uri("/triggers/t-1/disable")
            .insert_header(("authorization", "Bearer caller-token"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], json!("PENDING"));
        assert_eq!(state.registry.get("t-1"), TriggerState::Pending);
    }

    #[actix_web::test]
    async fn test_enable_is_idempotent() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        let app = test::init_service(app(state.clone())).await;

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/triggers/t-1/enable")
                .insert_header(("authorization", "Bearer caller-token"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), 200);
        }
        assert_eq!(state.registry.get("t-1"), TriggerState::Enabled);
    }

    #[actix_web::test]
    async fn test_event_rejected_unless_enabled() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        let app = test::init_service(app(state.clone())).await;

        let req = test::TestRequest::post()
            .uri("/triggers/t-1/event")
            .set_json(json!({"n": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 409);

        state
            .registry
            .set("t-1", TriggerState::Enabled)
            .unwrap();
        let req = test::TestRequest::post()
            .uri("/triggers/t-1/event")
            .set_json(json!({"n": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 202);
    }

    #[actix_web::test]
    async fn test_delete_without_poller_removes_immediately() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        let app = test::init_service(app(state.clone())).await;

        let req = test::TestRequest::delete()
            .uri("/triggers/t-1")
            .insert_header(("authorization", "Bearer caller-token"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], json!("DELETING"));

        // removed from the store; further transitions conflict
        assert!(state.store.get("t-1").await.unwrap().is_none());
        assert!(state.registry.set("t-1", TriggerState::Pending).is_err());

        let req = test::TestRequest::get().uri("/triggers/t-1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn test_delete_twice_conflicts() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        state.registry.set("t-1", TriggerState::Deleting).unwrap();
        // keep the row around so the lookup succeeds
        let app = test::init_service(app(state)).await;

        let req = test::TestRequest::delete()
            .uri("/triggers/t-1")
            .insert_header(("authorization", "Bearer caller-token"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 409);
    }

    #[actix_web::test]
    async fn test_list_filters_by_creator() {
        let state = app_state();
        state
            .store
            .put(&seeded_trigger(TriggerState::Pending))
            .await
            .unwrap();
        let mut other = seeded_trigger(TriggerState::Pending);
        other.trigger_id = "t-2".to_string();
        other.created_by = "someone-else".to_string();
        state.store.put(&other).await.unwrap();

        let app = test::init_service(app(state)).await;
        let req = test::TestRequest::get()
            .uri("/triggers")
            .insert_header(("authorization", "Bearer caller-token"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let triggers = body.as_array().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["trigger_id"], json!("t-1"));
    }
}
