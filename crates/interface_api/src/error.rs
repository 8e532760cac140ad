//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use core_kernel::PortError;
use domain_billing::BillingError;

use crate::signature::SignatureError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Unhandled event type: {0}")]
    UnhandledEvent(String),

    #[error("No identity for event: {0}")]
    IdentityUnresolved(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] BillingError),

    #[error("Customer lookup failed: {0}")]
    Upstream(PortError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::InvalidSignature(_)
            | ApiError::UnhandledEvent(_) => StatusCode::BAD_REQUEST,
            ApiError::IdentityUnresolved(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Ledger(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidSignature(_) => "invalid_signature",
            ApiError::UnhandledEvent(_) => "unhandled_event",
            ApiError::IdentityUnresolved(_) => "identity_unresolved",
            ApiError::Conflict(_) => "conflict",
            ApiError::Ledger(_) => "ledger_error",
            ApiError::Upstream(_) => "upstream_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}
