//! Health check handler

use actix_web::{HttpResponse, Responder};

use crate::models::HealthResponse;

/// Service healthcheck
///
/// Served at both `/` and `/{service}/status`.
#[utoipa::path(
    get,
    path = "/status",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn healthcheck() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};

    #[actix_web::test]
    async fn test_healthcheck() {
        let app = test::init_service(
            App::new().route("/", web::get().to(healthcheck)),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }
}
