//! OpenAPI documentation configuration

use actix_web::{HttpResponse, Responder};
use utoipa::OpenApi;

use crate::handlers;
use crate::models;

/// OpenAPI documentation for the trigger service
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Trigger Service API",
        version = "0.1.0",
        description = "Binds message queues to action endpoints through user-defined filters and templates."
    ),
    paths(
        handlers::health::healthcheck,
        handlers::triggers::create_trigger,
        handlers::triggers::get_trigger,
        handlers::triggers::list_triggers,
        handlers::triggers::enable_trigger,
        handlers::triggers::disable_trigger,
        handlers::triggers::send_event,
        handlers::triggers::delete_trigger,
    ),
    components(schemas(
        models::CreateTriggerRequest,
        models::ResponseTrigger,
        models::ErrorResponse,
        models::HealthResponse,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Triggers", description = "Trigger registration and lifecycle")
    )
)]
pub struct ApiDoc;

/// Serve the generated OpenAPI document
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}
