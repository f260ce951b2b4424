//! Error handling for the Chorus API
//!
//! This module provides a unified error type hierarchy using thiserror,
//! with automatic HTTP status code mapping via Axum's IntoResponse trait.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Authentication ==========
    /// Request carried no identity header from the fronting proxy
    #[error("authentication required")]
    Unauthorized,

    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Resource already exists (conflict)
    #[error("{resource_type} already exists: {id}")]
    Conflict {
        resource_type: &'static str,
        id: String,
    },

    /// Operation is not valid for the current state of the resource
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Target exists but has no open connection to deliver to
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    // ========== Store Errors ==========
    /// Durable record store operation failed
    #[error("store error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized
            Self::Unauthorized => StatusCode::UNAUTHORIZED,

            // 404 Not Found; DeliveryFailed keeps the original API's
            // contract of reporting a disconnected target as 404
            Self::NotFound { .. } | Self::DeliveryFailed(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::Conflict { .. } | Self::InvalidState(_) => StatusCode::CONFLICT,

            // 400 Bad Request
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::DeliveryFailed(_) => "DELIVERY_FAILED",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Database(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Create a conflict error for a specific resource
    pub fn conflict(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type,
            id: id.into(),
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Authorization error"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// ========== Conversion Implementations ==========

impl From<crate::models::device::DeviceValidationError> for ApiError {
    fn from(err: crate::models::device::DeviceValidationError) -> Self {
        Self::ValidationError(err.to_string())
    }
}
