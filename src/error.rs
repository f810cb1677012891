//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{AmountError, DomainError};
use crate::outbox::OutboxError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Voucher code already exists: {0}")]
    VoucherCodeTaken(String),

    #[error("Sales transaction not found")]
    TransactionNotFound(i64),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::Amount(e) => (StatusCode::BAD_REQUEST, "invalid_amount", Some(e.to_string())),

            // 404 Not Found
            AppError::TransactionNotFound(order_id) => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                Some(format!("order_id {}", order_id)),
            ),

            // 409 Conflict
            AppError::VoucherCodeTaken(code) => {
                (StatusCode::CONFLICT, "voucher_code_taken", Some(code.clone()))
            }

            // 500 Internal Server Error
            // Inputs are validated before reaching the domain
            AppError::Domain(e) => {
                tracing::error!("Domain invariant violated: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Outbox(e) => {
                tracing::error!("Outbox error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "outbox_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
