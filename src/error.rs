// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Scan denials (`not_paid`, `already_used`, ...) are not errors; they are
//! returned as [`crate::models::ScanOutcome`] values. This type covers
//! transport-level rejections and infrastructure faults.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Gate ID is required")]
    MissingGateId,

    #[error("Unknown gate or invalid gate secret")]
    InvalidGate,

    #[error("Gate {0} is not active")]
    GateInactive(String),

    #[error("Too many requests from gate {0}")]
    RateLimited(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl AppError {
    /// Whether this error means the backing store could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AppError::Database(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::MissingGateId => (StatusCode::UNAUTHORIZED, "MISSING_GATE_ID"),
            AppError::InvalidGate => (StatusCode::UNAUTHORIZED, "INVALID_GATE"),
            AppError::GateInactive(_) => (StatusCode::FORBIDDEN, "GATE_INACTIVE"),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::SERVICE_UNAVAILABLE, "INTERNAL_ERROR")
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        // Never leak store or internal fault text to gate devices.
        let error = match &self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error,
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
