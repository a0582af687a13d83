//! Common response shapes

use serde::Serialize;
use utoipa::ToSchema;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of the failure
    pub message: String,
    /// Correlation id; also present on the `x-request-id` response header
    pub req_id: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, req_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            req_id: req_id.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
