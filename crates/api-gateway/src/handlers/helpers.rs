//! Common handler helpers
//!
//! Consolidates the patterns every handler needs: the request correlation
//! id, bearer-token session construction, error-to-response mapping, and
//! request validation.

use actix_web::{http::StatusCode, HttpMessage, HttpRequest, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use auth::AuthInfo;
use shared::Error;

use crate::middleware::RequestIdExt;
use crate::models::ErrorResponse;
use crate::state::AppState;

/// Correlation id for the current request.
pub fn request_id(req: &HttpRequest) -> String {
    req.extensions()
        .get::<RequestIdExt>()
        .map(|ext| ext.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Build the caller's auth session from the `Authorization` header.
///
/// A missing or malformed header yields a session with an empty token;
/// endpoints that require identity fail with 401 when they first touch it.
pub fn auth_session(state: &AppState, req: &HttpRequest) -> AuthInfo {
    let token = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");
    AuthInfo::new(Arc::clone(&state.identity), token)
}

/// Map an application error onto its HTTP response with the standard
/// `{"message", "req_id"}` body.
pub fn error_response(req_id: &str, err: &Error) -> HttpResponse {
    let status = match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(req_id = %req_id, error = %err, "Request failed");
    } else {
        tracing::info!(req_id = %req_id, error = %err, status = %status, "Request rejected");
    }
    HttpResponse::build(status).json(ErrorResponse::new(err.to_string(), req_id))
}

/// Validate a request DTO or produce the 400 response.
pub fn validate_request<T: Validate>(req: &T, req_id: &str) -> Result<(), HttpResponse> {
    req.validate()
        .map_err(|e| error_response(req_id, &Error::validation(e.to_string())))
}
