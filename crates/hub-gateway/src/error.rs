//! Gateway error type and its HTTP representation.
//!
//! Every error is rendered as `{"code": "...", "message": "..."}`, the same
//! shape the backend uses for its own error details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Mock mode cannot answer this request; only a live backend can.
    #[error("{operation} requires a configured backend")]
    BackendRequired { operation: &'static str },

    #[error("Job {job_id} not found or expired.")]
    JobNotFound { job_id: String },

    #[error("Taxonomy {taxonomy_id} not found")]
    TaxonomyNotFound { taxonomy_id: String },

    /// Transport failure talking to the backend (connect, reset, timeout).
    #[error("backend unreachable: {0}")]
    BackendUnreachable(#[source] reqwest::Error),

    /// The backend declared JSON but sent something that does not decode.
    #[error("backend returned an invalid JSON body: {0}")]
    InvalidBackendResponse(#[source] serde_json::Error),

    #[error("HTTP method {0} is not supported")]
    UnsupportedMethod(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
}

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl GatewayError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BackendRequired { .. } => "BACKEND_REQUIRED",
            GatewayError::JobNotFound { .. } => "JOB_NOT_FOUND",
            GatewayError::TaxonomyNotFound { .. } => "TAXONOMY_NOT_FOUND",
            GatewayError::BackendUnreachable(e) if e.is_timeout() => "BACKEND_TIMEOUT",
            GatewayError::BackendUnreachable(_) => "BACKEND_UNREACHABLE",
            GatewayError::InvalidBackendResponse(_) => "INVALID_BACKEND_RESPONSE",
            GatewayError::UnsupportedMethod(_) => "METHOD_NOT_ALLOWED",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BackendRequired { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::JobNotFound { .. } | GatewayError::TaxonomyNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::BackendUnreachable(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BackendUnreachable(_) | GatewayError::InvalidBackendResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }
        (status, axum::Json(self.body())).into_response()
    }
}
