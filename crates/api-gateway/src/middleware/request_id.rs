//! Request ID middleware
//!
//! Every request gets a correlation id. A well-formed inbound
//! `x-request-id` header is honored so ids line up across services; a
//! missing or malformed one is replaced with a fresh UUID. The id lands in
//! request extensions for handlers, on the response header, and in error
//! bodies as `req_id`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inbound ids longer than this are treated as malformed
const MAX_REQUEST_ID_LEN: usize = 64;

/// Request id stored in request extensions
#[derive(Debug, Clone)]
pub struct RequestIdExt(pub String);

/// Accept an inbound id only when it is short and printable ASCII;
/// anything else gets a fresh UUID.
fn resolve_request_id(inbound: Option<&str>) -> String {
    match inbound {
        Some(id)
            if !id.is_empty()
                && id.len() <= MAX_REQUEST_ID_LEN
                && id.bytes().all(|b| b.is_ascii_graphic()) =>
        {
            id.to_string()
        }
        _ => Uuid::new_v4().to_string(),
    }
}

/// Request ID middleware
pub struct RequestId;

impl RequestId {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestIdMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let request_id = resolve_request_id(
            req.headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|h| h.to_str().ok()),
        );
        req.extensions_mut().insert(RequestIdExt(request_id.clone()));

        Box::pin(async move {
            let mut res = service.call(req).await?;
            if let Ok(value) = HeaderValue::try_from(&request_id) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, web, App, HttpRequest, HttpResponse};

    #[test]
    fn test_resolve_request_id_accepts_clean_ids() {
        assert_eq!(resolve_request_id(Some("abc-123")), "abc-123");
    }

    #[test]
    fn test_resolve_request_id_rejects_bad_ids() {
        for bad in [
            Some(""),
            Some("has space"),
            Some("line\nbreak"),
            None,
            Some("x".repeat(65)).as_deref(),
        ] {
            let resolved = resolve_request_id(bad);
            assert!(Uuid::parse_str(&resolved).is_ok(), "input {:?}", bad);
        }
    }

    #[actix_web::test]
    async fn test_id_flows_through_extensions_and_response() {
        async fn echo_id(req: HttpRequest) -> HttpResponse {
            let id = req
                .extensions()
                .get::<RequestIdExt>()
                .map(|ext| ext.0.clone())
                .unwrap_or_default();
            HttpResponse::Ok().body(id)
        }

        let app = actix_test::init_service(
            App::new()
                .wrap(RequestId::new())
                .route("/", web::get().to(echo_id)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/")
            .insert_header((REQUEST_ID_HEADER, "trace-me-42"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(
            resp.headers()
                .get(REQUEST_ID_HEADER)
                .unwrap()
                .to_str()
                .unwrap(),
            "trace-me-42"
        );
        let body = actix_test::read_body(resp).await;
        assert_eq!(body, "trace-me-42");
    }
}
