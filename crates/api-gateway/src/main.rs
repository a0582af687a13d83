//! Trigger service API gateway
//!
//! The service binary: loads configuration, wires the trigger store, the
//! identity client, and the poller supervisor together, recovers persisted
//! ENABLED triggers, and serves the HTTP surface until shutdown.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_actix_web::TracingLogger;

use auth::IdentityClient;
use shared::{Config, PgTriggerStore, TriggerStore};
use trigger_engine::{
    HttpActionClient, HttpQueueClient, PollerContext, PollerSupervisor, TriggerStateRegistry,
};

mod handlers;
mod middleware;
mod models;
mod openapi;
mod routes;
mod state;

use middleware::RequestId;
use state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    shared::init_tracing(&config.log);

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Starting trigger service..."
    );

    // Connect the trigger store (pool + health check + optional table)
    let store: Arc<dyn TriggerStore> = Arc::new(
        PgTriggerStore::connect(&config.store)
            .await
            .context("Failed to connect trigger store")?,
    );

    // One outbound connection pool for every HTTP client
    let http = reqwest::Client::new();
    let identity = Arc::new(IdentityClient::from_config(http.clone(), &config.auth));
    let registry = Arc::new(TriggerStateRegistry::new());

    let ctx = PollerContext {
        store: store.clone(),
        queue: Arc::new(HttpQueueClient::new(http.clone(), &config.queues.base_url)),
        actions: Arc::new(HttpActionClient::new(http.clone())),
        refresher: identity.clone(),
        registry: registry.clone(),
        shutdown: CancellationToken::new(),
        action_status_log_limit: config.engine.action_status_log_limit,
    };
    let supervisor = Arc::new(PollerSupervisor::new(
        ctx,
        config.engine.reaper_queue_capacity,
    ));
    supervisor
        .start()
        .await
        .context("Failed to start poller supervisor")?;

    let app_state = web::Data::new(AppState {
        store,
        identity,
        registry,
        supervisor: supervisor.clone(),
        http,
    });

    let service_name = config.service.name.clone();
    tracing::info!(
        host = %config.service.host,
        port = config.service.port,
        "HTTP surface listening"
    );
    HttpServer::new(move || {
        let service_name = service_name.clone();
        App::new()
            .wrap(TracingLogger::default())
            .wrap(RequestId::new())
            .app_data(app_state.clone())
            .configure(move |cfg| routes::configure(cfg, &service_name))
    })
    .bind((config.service.host.as_str(), config.service.port))?
    .run()
    .await
    .context("HTTP server failed")?;

    // actix has drained its workers; now stop pollers and the reaper
    supervisor.shutdown().await;
    tracing::info!("Trigger service stopped");

    Ok(())
}
