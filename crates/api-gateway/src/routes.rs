//! Route configuration for the API

use actix_web::web;

use crate::handlers;

/// Configure all routes.
///
/// The healthcheck answers at the root; everything else lives under the
/// configured service-name prefix.
pub fn configure(cfg: &mut web::ServiceConfig, service_name: &str) {
    cfg.route("/", web::get().to(handlers::health::healthcheck));
    cfg.service(
        web::scope(&format!("/{}", service_name))
            .route("/status", web::get().to(handlers::health::healthcheck))
            .route("/openapi.json", web::get().to(crate::openapi::openapi_json))
            .route("/triggers", web::post().to(handlers::triggers::create_trigger))
            .route("/triggers", web::get().to(handlers::triggers::list_triggers))
            .route(
                "/triggers/{trigger_id}",
                web::get().to(handlers::triggers::get_trigger),
            )
            .route(
                "/triggers/{trigger_id}/enable",
                web::post().to(handlers::triggers::enable_trigger),
            )
            .route(
                "/triggers/{trigger_id}/disable",
                web::post().to(handlers::triggers::disable_trigger),
            )
            .route(
                "/triggers/{trigger_id}/event",
                web::post().to(handlers::triggers::send_event),
            )
            .route(
                "/triggers/{trigger_id}",
                web::delete().to(handlers::triggers::delete_trigger),
            ),
    );
}
